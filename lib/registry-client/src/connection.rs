//! Connection factory seam: turns a resolved address into a client connection

use crate::policy::RetryPolicy;
use crate::resolver::Resolver;
use crate::{ClientError, Result};
use async_trait::async_trait;
use std::fmt::Display;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Produces a transport-level client for one resolved address.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Connection: Send;
    type Error: Display + Send;

    async fn connect(&self, address: &str) -> std::result::Result<Self::Connection, Self::Error>;
}

/// Plain TCP connections with a connect timeout
#[derive(Clone, Debug)]
pub struct TcpConnectionFactory {
    connect_timeout: Duration,
}

impl TcpConnectionFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnectionFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl ConnectionFactory for TcpConnectionFactory {
    type Connection = TcpStream;
    type Error = io::Error;

    async fn connect(&self, address: &str) -> io::Result<TcpStream> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {} timed out after {:?}", address, self.connect_timeout),
            )),
        }
    }
}

/// Resolves a service and connects to the chosen instance.
///
/// A failed connect is retried up to `retry.max_retries` times, each time
/// against a freshly resolved address.
pub struct ServiceConnector<F> {
    resolver: Resolver,
    factory: F,
    retry: RetryPolicy,
}

impl<F: ConnectionFactory> ServiceConnector<F> {
    pub fn new(resolver: Resolver, factory: F, retry: RetryPolicy) -> Self {
        Self {
            resolver,
            factory,
            retry,
        }
    }

    pub async fn connect(&self, service_name: &str) -> Result<F::Connection> {
        let mut retries = 0;
        loop {
            let address = self.resolver.resolve(service_name).await?;
            match self.factory.connect(&address).await {
                Ok(connection) => {
                    debug!(service = service_name, address = %address, "Connected");
                    return Ok(connection);
                }
                Err(e) if retries < self.retry.max_retries => {
                    let backoff = self.retry.backoff_duration(retries);
                    warn!(
                        service = service_name,
                        address = %address,
                        "Connect failed: {}, retrying in {:?}",
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    retries += 1;
                }
                Err(e) => {
                    return Err(ClientError::Connect {
                        service: service_name.to_string(),
                        address,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}
