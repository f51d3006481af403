//! Custom Resource Definitions for the shared-service operator
//!
//! The operator owns the `aerogear.org` kinds and drives the Service
//! Catalog kinds in [`catalog`] through the provisioning client.

mod catalog;
mod client;
mod shared_service;
mod slice;
mod types;

pub use catalog::{
    ClusterObjectReference, ClusterServiceClass, ClusterServiceClassSpec, ClusterServicePlan,
    ClusterServicePlanSpec, ServiceInstance, ServiceInstanceSpec, ServiceInstanceStatus,
};
pub use client::{SharedServiceClient, SharedServiceClientSpec, SharedServiceClientStatus};
pub use shared_service::{SharedService, SharedServiceSpec, SharedServiceStatus};
pub use slice::{SharedServiceSlice, SharedServiceSliceSpec, SharedServiceSliceStatus};
pub use types::{Condition, ConditionStatus, Phase, SliceAction};
