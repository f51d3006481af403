//! SharedServiceClient Custom Resource Definition
//!
//! Consumer-side binding to a slice. The operator only acknowledges it.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Phase;

/// Specification for a SharedServiceClient
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aerogear.org",
    version = "v1alpha1",
    kind = "SharedServiceClient",
    plural = "sharedserviceclients",
    shortname = "ssc",
    status = "SharedServiceClientStatus",
    namespaced,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.serviceType"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SharedServiceClientSpec {
    /// Service type the client consumes
    #[serde(default)]
    pub service_type: String,

    /// Client-specific parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// Status for a SharedServiceClient
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SharedServiceClientStatus {
    /// Current phase
    #[serde(default)]
    pub phase: Phase,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
