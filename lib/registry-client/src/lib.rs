//! Client side of the service registry
//!
//! Everything a worker process needs: registering itself and keeping its
//! registration alive, and resolving a logical service name to one address.
pub mod backend;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod load_balancer;
pub mod policy;
pub mod registration;
pub mod resolver;

pub use backend::build_registry;
pub use connection::{ConnectionFactory, ServiceConnector, TcpConnectionFactory};
pub use error::{ClientError, Result};
pub use heartbeat::{HeartbeatConfig, HeartbeatHandle, HeartbeatLoop};
pub use load_balancer::{RandomSelection, RoundRobinSelection, SelectionStrategy};
pub use policy::RetryPolicy;
pub use registration::Registration;
pub use resolver::Resolver;
