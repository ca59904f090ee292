//! Registry server: exposes a `Registry` over the JSON protocol in [`crate::api`]

use crate::api::{
    self, DiscoverRequest, DiscoverResponse, ErrorBody, InstanceRequest, RegisterRequest,
};
use crate::metrics::RegistryMetrics;
use anyhow::Result;
use http_body_util::{BodyExt, Full, Limited};
use hyper::{
    body::{Bytes, Incoming},
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use registry_core::Registry;
use serde::{de::DeserializeOwned, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    Register,
    Deregister,
    Heartbeat,
    Discover,
}

impl Operation {
    fn from_path(path: &str) -> Option<Self> {
        match path {
            api::REGISTER_PATH => Some(Operation::Register),
            api::DEREGISTER_PATH => Some(Operation::Deregister),
            api::HEARTBEAT_PATH => Some(Operation::Heartbeat),
            api::DISCOVER_PATH => Some(Operation::Discover),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Operation::Register => "register",
            Operation::Deregister => "deregister",
            Operation::Heartbeat => "heartbeat",
            Operation::Discover => "discover",
        }
    }
}

/// HTTP front end for a registry backend.
///
/// Liveness timestamps are taken by the backend when a request is processed,
/// so worker clocks never influence expiry.
pub struct RegistryServer {
    registry: Arc<dyn Registry>,
    metrics: RegistryMetrics,
}

impl RegistryServer {
    pub fn new(registry: Arc<dyn Registry>, metrics: RegistryMetrics) -> Self {
        Self { registry, metrics }
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let server = Arc::new(self);
        info!("Registry server listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Registry server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Error accepting connection: {}", e);
                        continue;
                    }
                },
            };

            let io = TokioIo::new(stream);
            let server = server.clone();
            let shutdown = shutdown.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle(req).await }
                });

                let conn = http1::Builder::new().serve_connection(io, service);
                tokio::pin!(conn);

                let result = tokio::select! {
                    result = conn.as_mut() => result,
                    _ = shutdown.cancelled() => {
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                };
                if let Err(e) = result {
                    debug!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }

    async fn handle(&self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!("{} {}", method, path);

        let response = match (&method, path.as_str()) {
            (&Method::GET, "/healthz") => text_response(StatusCode::OK, "OK\n".to_string()),
            (&Method::GET, "/metrics") => match self.metrics.gather() {
                Ok(text) => metrics_response(text),
                Err(e) => text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to gather metrics: {}\n", e),
                ),
            },
            (&Method::POST, _) => match Operation::from_path(&path) {
                Some(operation) => self.handle_operation(operation, req).await,
                None => text_response(StatusCode::NOT_FOUND, format!("Not Found: {}\n", path)),
            },
            _ => text_response(StatusCode::NOT_FOUND, format!("Not Found: {}\n", path)),
        };
        Ok(response)
    }

    async fn handle_operation(
        &self,
        operation: Operation,
        req: Request<Incoming>,
    ) -> Response<Full<Bytes>> {
        let started = Instant::now();
        let result = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
            Ok(collected) => self.apply(operation, &collected.to_bytes()).await,
            Err(e) => Err(ErrorBody::bad_request(format!("failed to read body: {}", e))),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(body) => body.code.as_str(),
        };
        self.metrics.observe(operation.name(), outcome, started.elapsed());

        match result {
            Ok(Some(discovered)) => json_response(StatusCode::OK, &discovered),
            Ok(None) => empty_response(StatusCode::NO_CONTENT),
            Err(body) => {
                debug!(operation = operation.name(), code = outcome, "{}", body.message);
                let status = StatusCode::from_u16(body.code.status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                json_response(status, &body)
            }
        }
    }

    async fn apply(
        &self,
        operation: Operation,
        body: &[u8],
    ) -> std::result::Result<Option<DiscoverResponse>, ErrorBody> {
        match operation {
            Operation::Register => {
                let req: RegisterRequest = parse_body(body)?;
                self.registry
                    .register(&req.instance_id, &req.service_name, &req.address)
                    .await
                    .map_err(|e| ErrorBody::from(&e))?;
                Ok(None)
            }
            Operation::Deregister => {
                let req: InstanceRequest = parse_body(body)?;
                self.registry
                    .deregister(&req.instance_id, &req.service_name)
                    .await
                    .map_err(|e| ErrorBody::from(&e))?;
                Ok(None)
            }
            Operation::Heartbeat => {
                let req: InstanceRequest = parse_body(body)?;
                self.registry
                    .health_check(&req.instance_id, &req.service_name)
                    .await
                    .map_err(|e| ErrorBody::from(&e))?;
                Ok(None)
            }
            Operation::Discover => {
                let req: DiscoverRequest = parse_body(body)?;
                let addresses = self
                    .registry
                    .discover(&req.service_name)
                    .await
                    .map_err(|e| ErrorBody::from(&e))?;
                Ok(Some(DiscoverResponse {
                    service_name: req.service_name,
                    addresses,
                }))
            }
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> std::result::Result<T, ErrorBody> {
    serde_json::from_slice(body)
        .map_err(|e| ErrorBody::bad_request(format!("invalid request body: {}", e)))
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// Prometheus text exposition format
fn metrics_response(body: String) -> Response<Full<Bytes>> {
    let mut response = text_response(StatusCode::OK, body);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));
    response
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode response: {}\n", e),
        ),
    }
}
