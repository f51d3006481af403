//! Shared-service operator - shares provisioned backing services between tenants
//!
//! Expensive backing services are provisioned once per type through the
//! Kubernetes Service Catalog and carved into tenant "slices". Ready shared
//! services are surfaced to external platforms through a service-broker style
//! catalog/instance/binding contract.
//!
//! # Architecture
//!
//! - Administrators create `SharedService` resources; each becomes one
//!   ServiceInstance provisioned from the `default` plan
//! - Tenants create `SharedServiceSlice` resources; each is allocated onto a
//!   ready shared instance with free capacity and provisioned from the
//!   `shared` plan
//! - Every reconcile performs exactly one state advance and persists it; the
//!   persisted change comes back as the next watch event
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions and Service Catalog views
//! - [`controller`] - Phase state machines and the reconcile dispatcher
//! - [`watch`] - Watch/resync event source feeding the dispatcher
//! - [`provisioning`] - Service Catalog client abstraction
//! - [`capacity`] - Slice-to-instance capacity allocation
//! - [`params`] - Per-tenant provisioning parameter resolution
//! - [`secrets`] - Label-selected secret lookup
//! - [`broker`] - Service-broker adapter over ready shared services
//! - [`config`] - Resolved runtime configuration
//! - [`deadline`] - Deadlines for external calls
//! - [`telemetry`] - Logging initialization
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod broker;
pub mod capacity;
pub mod config;
pub mod controller;
pub mod crd;
pub mod deadline;
pub mod error;
pub mod params;
pub mod provisioning;
pub mod secrets;
pub mod telemetry;
pub mod watch;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Naming Constants
// =============================================================================

/// Field manager and `managed-by` label value
pub const OPERATOR_NAME: &str = "shared-service-operator";

/// Label marking objects created by the operator
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Plan a SharedService's backing instance is provisioned from
pub const DEFAULT_PLAN: &str = "default";

/// Plan slices are provisioned from, and the single plan offered in the broker catalog
pub const SHARED_PLAN: &str = "shared";

/// Slice label mirroring `status.sharedInstanceRef`
pub const SHARED_INSTANCE_LABEL: &str = "SharedServiceInstance";

/// Slice label mirroring `status.sliceInstanceRef`
pub const SLICE_INSTANCE_LABEL: &str = "SliceServiceInstance";

/// Slices a shared instance accepts when its spec doesn't say
pub const DEFAULT_SLICE_CAPACITY: u32 = 10;
