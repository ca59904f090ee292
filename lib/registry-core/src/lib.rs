//! Core service registry functionality
//!
//! This library provides:
//! - Instance records and instance ID generation
//! - The `Registry` contract (register, deregister, health check, discover)
//! - An in-memory, lock-protected registry backend
//! - Registry configuration shared by servers and workers

pub mod config;
pub mod error;
pub mod instance;
pub mod memory;
pub mod registry;

pub use config::{BackendKind, RegistryConfig, SelectionPolicy};
pub use error::{RegistryError, Result};
pub use instance::{generate_instance_id, InstanceRecord};
pub use memory::MemoryRegistry;
pub use registry::Registry;
