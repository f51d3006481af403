//! Shared types used across the operator's CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle phase shared by SharedService, SharedServiceSlice and SharedServiceClient
///
/// Serialized as the bare phase name; the initial phase is the empty string.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum Phase {
    /// Resource has not been observed by the operator yet
    #[default]
    #[serde(rename = "")]
    None,
    /// Resource was observed and accepted for processing
    Accepted,
    /// External provisioning has been requested
    Provisioning,
    /// Resource is fully provisioned
    Complete,
    /// Resource hit a non-recoverable error
    Failed,
}

impl Phase {
    /// Terminal phases never advance without external intervention
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Accepted => write!(f, "Accepted"),
            Self::Provisioning => write!(f, "Provisioning"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Provisioning progress of a slice's tenant sub-resource
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SliceAction {
    /// Nothing has been submitted yet
    #[default]
    #[serde(rename = "")]
    None,
    /// Slice instance submitted, waiting for readiness
    Provisioning,
    /// Slice instance reported ready
    Provisioned,
}

impl std::fmt::Display for SliceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, ""),
            Self::Provisioning => write!(f, "provisioning"),
            Self::Provisioned => write!(f, "provisioned"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

/// Kubernetes-style condition as reported by the provisioning system
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., Ready, Failed)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Some(Utc::now()),
        }
    }

    /// True when this is a `Ready=True` condition
    pub fn is_ready(&self) -> bool {
        self.type_ == "Ready" && self.status == ConditionStatus::True
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod phase {
        use super::*;

        #[test]
        fn test_initial_phase_serializes_as_empty_string() {
            assert_eq!(serde_json::to_string(&Phase::None).unwrap(), r#""""#);
            assert_eq!(
                serde_json::from_str::<Phase>(r#""""#).unwrap(),
                Phase::None
            );
        }

        #[test]
        fn test_named_phases_round_trip_by_name() {
            assert_eq!(
                serde_json::to_string(&Phase::Provisioning).unwrap(),
                r#""Provisioning""#
            );
            assert_eq!(
                serde_json::from_str::<Phase>(r#""Failed""#).unwrap(),
                Phase::Failed
            );
        }

        #[test]
        fn test_terminal_phases() {
            assert!(Phase::Complete.is_terminal());
            assert!(Phase::Failed.is_terminal());
            assert!(!Phase::None.is_terminal());
            assert!(!Phase::Accepted.is_terminal());
            assert!(!Phase::Provisioning.is_terminal());
        }

        #[test]
        fn test_display() {
            assert_eq!(Phase::None.to_string(), "None");
            assert_eq!(Phase::Complete.to_string(), "Complete");
        }
    }

    mod slice_action {
        use super::*;

        #[test]
        fn test_wire_values() {
            assert_eq!(serde_json::to_string(&SliceAction::None).unwrap(), r#""""#);
            assert_eq!(
                serde_json::to_string(&SliceAction::Provisioning).unwrap(),
                r#""provisioning""#
            );
            assert_eq!(
                serde_json::from_str::<SliceAction>(r#""provisioned""#).unwrap(),
                SliceAction::Provisioned
            );
        }
    }

    mod condition {
        use super::*;

        #[test]
        fn test_ready_condition_detection() {
            assert!(Condition::new("Ready", ConditionStatus::True, "Provisioned", "").is_ready());
            assert!(!Condition::new("Ready", ConditionStatus::False, "Provisioning", "").is_ready());
            assert!(!Condition::new("Failed", ConditionStatus::True, "Error", "").is_ready());
        }

        #[test]
        fn test_parses_service_catalog_condition() {
            let json = r#"{
                "type": "Ready",
                "status": "True",
                "reason": "ProvisionedSuccessfully",
                "message": "The instance was provisioned successfully",
                "lastTransitionTime": "2024-03-01T10:00:00Z"
            }"#;
            let cond: Condition = serde_json::from_str(json).unwrap();
            assert!(cond.is_ready());
            assert!(cond.last_transition_time.is_some());
        }
    }
}
