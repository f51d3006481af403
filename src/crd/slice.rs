//! SharedServiceSlice Custom Resource Definition
//!
//! A slice is one tenant's claim on a shared service of a given type.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Phase, SliceAction};

/// Specification for a SharedServiceSlice
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aerogear.org",
    version = "v1alpha1",
    kind = "SharedServiceSlice",
    plural = "sharedserviceslices",
    shortname = "sss",
    status = "SharedServiceSliceStatus",
    namespaced,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.serviceType"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Action","type":"string","jsonPath":".status.action"}"#,
    printcolumn = r#"{"name":"Shared","type":"string","jsonPath":".status.sharedInstanceRef"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SharedServiceSliceSpec {
    /// Service type, matched against SharedService `classExternalName`
    pub service_type: String,

    /// Tenant parameters; these win over values from the shared instance's secret
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl SharedServiceSliceSpec {
    /// Validate the slice specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.service_type.trim().is_empty() {
            return Err(crate::Error::validation("slice 'serviceType' must be set"));
        }
        Ok(())
    }
}

/// Status for a SharedServiceSlice
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SharedServiceSliceStatus {
    /// Current phase of the slice lifecycle
    #[serde(default)]
    pub phase: Phase,

    /// Progress of the tenant sub-resource
    #[serde(default)]
    pub action: SliceAction,

    /// Secret holding the slice's credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<String>,

    /// ServiceInstance provisioned for this tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_instance_ref: Option<String>,

    /// Shared ServiceInstance this slice was allocated onto; never changes once set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_instance_ref: Option<String>,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SharedServiceSliceStatus {
    /// Set the phase and return self for chaining
    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Set the action and return self for chaining
    pub fn action(mut self, action: SliceAction) -> Self {
        self.action = action;
        self
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Shared instance reference, treating an empty string as unset
    pub fn shared_instance(&self) -> Option<&str> {
        self.shared_instance_ref.as_deref().filter(|s| !s.is_empty())
    }

    /// Slice instance reference, treating an empty string as unset
    pub fn slice_instance(&self) -> Option<&str> {
        self.slice_instance_ref.as_deref().filter(|s| !s.is_empty())
    }
}

impl SharedServiceSlice {
    /// Current status, or the initial one if the operator never wrote it
    pub fn current_status(&self) -> SharedServiceSliceStatus {
        self.status.clone().unwrap_or_default()
    }
}
