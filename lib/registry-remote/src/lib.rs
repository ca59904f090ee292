//! Remote registry backend
//!
//! A registry server exposing any `Registry` over a small JSON-over-HTTP
//! protocol, and an HTTP client implementing `Registry` against it.
pub mod api;
pub mod client;
pub mod metrics;
pub mod server;

pub use client::HttpRegistry;
pub use metrics::RegistryMetrics;
pub use server::RegistryServer;
