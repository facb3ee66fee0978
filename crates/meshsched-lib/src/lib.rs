//! Network-aware scheduling for Kubernetes clusters on a mesh overlay
//!
//! This crate provides the core functionality for:
//! - Measuring node-to-node latency and bandwidth (`controller`)
//! - Publishing the cluster `NetworkTopology` resource (`topology`)
//! - Filtering and scoring nodes by network fitness (`scheduler`)
//! - Health checks and observability

pub mod controller;
pub mod health;
pub mod models;
pub mod observability;
pub mod scheduler;
pub mod server;
pub mod topology;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ControllerMetrics, SchedulerMetrics, StructuredLogger};
pub use topology::{NetworkTopology, NetworkTopologySpec, TopologyError, TopologyStore};
