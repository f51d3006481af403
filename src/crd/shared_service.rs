//! SharedService Custom Resource Definition
//!
//! A SharedService asks for one backing-service instance that many tenant
//! slices are later carved out of.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Phase;

/// Specification for a SharedService
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aerogear.org",
    version = "v1alpha1",
    kind = "SharedService",
    plural = "sharedservices",
    shortname = "ss",
    status = "SharedServiceStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Class","type":"string","jsonPath":".spec.classExternalName"}"#,
    printcolumn = r#"{"name":"Instance","type":"string","jsonPath":".status.instanceRef"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SharedServiceSpec {
    /// Image identifying the service implementation
    pub image: String,

    /// Explicit ClusterServiceClass name; wins over `class_external_name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_ref: Option<String>,

    /// External-facing class name, also the service type slices request
    #[serde(default)]
    pub class_external_name: String,

    /// Parameters passed through to the provisioning request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,

    /// Maximum number of slices this instance accepts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
}

impl SharedServiceSpec {
    /// Validate the shared service specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.image.trim().is_empty() {
            return Err(crate::Error::validation("shared service 'image' must be set"));
        }

        let has_class_ref = self.class_ref.as_deref().is_some_and(|c| !c.is_empty());
        if !has_class_ref && self.class_external_name.is_empty() {
            return Err(crate::Error::validation(
                "shared service needs either 'classRef' or 'classExternalName'",
            ));
        }

        if self.capacity == Some(0) {
            return Err(crate::Error::validation(
                "shared service 'capacity' must be at least 1",
            ));
        }

        Ok(())
    }
}

/// Status for a SharedService
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SharedServiceStatus {
    /// Current phase of the shared service lifecycle
    #[serde(default)]
    pub phase: Phase,

    /// Whether the backing instance reported Ready
    #[serde(default)]
    pub ready: bool,

    /// Name of the provisioned ServiceInstance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_ref: Option<String>,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SharedServiceStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: Phase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the phase and return self for chaining
    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Record the backing instance and return self for chaining
    pub fn instance_ref(mut self, name: impl Into<String>) -> Self {
        self.instance_ref = Some(name.into());
        self
    }

    /// Set the ready flag and return self for chaining
    pub fn ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }
}

impl SharedService {
    /// Current status, or the initial one if the operator never wrote it
    pub fn current_status(&self) -> SharedServiceStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Service type slices use to request this shared service
    pub fn service_type(&self) -> &str {
        &self.spec.class_external_name
    }
}
