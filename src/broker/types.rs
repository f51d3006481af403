//! Provisioning-protocol payloads
//!
//! Field names follow the service broker wire format (snake_case).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Credentials handed out on bind
pub type Credentials = BTreeMap<String, String>;

/// Catalog of offered services
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Offered services
    pub services: Vec<Service>,
}

/// One offered service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Display name
    pub name: String,
    /// Stable service ID
    pub id: String,
    /// Human-readable description
    pub description: String,
    /// Whether instances can be bound
    pub bindable: bool,
    /// Plans the service is offered under
    pub plans: Vec<ServicePlan>,
}

/// One plan of a service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServicePlan {
    /// Plan name
    pub name: String,
    /// Stable plan ID
    pub id: String,
    /// Human-readable description
    pub description: String,
    /// Whether the plan is free of charge
    pub free: bool,
    /// Whether instances of this plan can be bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindable: Option<bool>,
}

/// Request to create a service instance
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateServiceInstanceRequest {
    /// Service being instantiated
    #[serde(default)]
    pub service_id: String,
    /// Plan being instantiated
    #[serde(default)]
    pub plan_id: String,
    /// Free-form parameters; `credentials` is read when present
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Acknowledgment of an instance creation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateServiceInstanceResponse {
    /// Dashboard for the instance, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    /// Operation token for asynchronous creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

/// Acknowledgment of an instance removal
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteServiceInstanceResponse {
    /// Operation token for asynchronous removal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

/// Request to bind to an instance
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingRequest {
    /// Service of the bound instance
    #[serde(default)]
    pub service_id: String,
    /// Plan of the bound instance
    #[serde(default)]
    pub plan_id: String,
    /// Free-form binding parameters
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Result of a bind
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateServiceBindingResponse {
    /// Credentials for the bound instance
    pub credentials: Credentials,
}

/// State of an asynchronous operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LastOperationState {
    /// Still running
    #[serde(rename = "in progress")]
    InProgress,
    /// Finished successfully
    #[serde(rename = "succeeded")]
    Succeeded,
    /// Finished unsuccessfully
    #[serde(rename = "failed")]
    Failed,
}

/// Report on an asynchronous operation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LastOperationResponse {
    /// Operation state
    pub state: LastOperationState,
    /// Human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
