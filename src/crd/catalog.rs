//! Typed views of the Service Catalog resources the operator drives
//!
//! Only the fields read or written here are modelled; everything else the
//! catalog stores is ignored on deserialization.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Specification for a Service Catalog ServiceInstance
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ServiceInstance",
    plural = "serviceinstances",
    status = "ServiceInstanceStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstanceSpec {
    /// External name of the class to provision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_service_class_external_name: Option<String>,

    /// External name of the plan to provision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_service_plan_external_name: Option<String>,

    /// Class resolved by the catalog controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_service_class_ref: Option<ClusterObjectReference>,

    /// Provisioning parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,

    /// Broker-facing instance ID, assigned by the catalog
    #[serde(rename = "externalID", default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// Status for a ServiceInstance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstanceStatus {
    /// Conditions reported by the catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ServiceInstance {
    /// True when the catalog reports `Ready=True`
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.conditions.iter().any(Condition::is_ready))
    }
}

/// Specification for a ClusterServiceClass
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ClusterServiceClass",
    plural = "clusterserviceclasses"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceClassSpec {
    /// Human-facing class name
    pub external_name: String,

    /// Class description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Reference to a cluster-scoped object by name
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ClusterObjectReference {
    /// Object name
    pub name: String,
}

/// Specification for a ClusterServicePlan
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ClusterServicePlan",
    plural = "clusterserviceplans"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServicePlanSpec {
    /// Human-facing plan name
    pub external_name: String,

    /// Class this plan belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_service_class_ref: Option<ClusterObjectReference>,

    /// JSON schema of the parameters accepted at provision time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_create_parameter_schema: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::types::ConditionStatus;

    #[test]
    fn test_instance_readiness_from_conditions() {
        let mut instance = ServiceInstance::new("keycloak-1a2b", ServiceInstanceSpec::default());
        assert!(!instance.is_ready());

        instance.status = Some(ServiceInstanceStatus {
            conditions: vec![Condition::new(
                "Ready",
                ConditionStatus::False,
                "Provisioning",
                "",
            )],
        });
        assert!(!instance.is_ready());

        instance.status = Some(ServiceInstanceStatus {
            conditions: vec![
                Condition::new("Failed", ConditionStatus::False, "", ""),
                Condition::new("Ready", ConditionStatus::True, "ProvisionedSuccessfully", ""),
            ],
        });
        assert!(instance.is_ready());
    }

    #[test]
    fn test_parses_catalog_instance_with_unknown_fields() {
        let json = serde_json::json!({
            "apiVersion": "servicecatalog.k8s.io/v1beta1",
            "kind": "ServiceInstance",
            "metadata": {"name": "keycloak-1a2b", "namespace": "mobile"},
            "spec": {
                "clusterServiceClassExternalName": "keycloak",
                "clusterServicePlanExternalName": "default",
                "clusterServiceClassRef": {"name": "4f6e"},
                "externalID": "8b0f8b5e-7b44-4c38-9e1c-7d5a4c3b2a10",
                "updateRequests": 0
            },
            "status": {"conditions": [], "asyncOpInProgress": false}
        });
        let instance: ServiceInstance = serde_json::from_value(json).unwrap();
        assert_eq!(
            instance.spec.external_id.as_deref(),
            Some("8b0f8b5e-7b44-4c38-9e1c-7d5a4c3b2a10")
        );
        assert_eq!(
            instance.spec.cluster_service_class_ref.as_ref().map(|r| r.name.clone()),
            Some("4f6e".to_string())
        );
        assert!(!instance.is_ready());
    }

    #[test]
    fn test_plan_schema_is_kept_verbatim() {
        let json = serde_json::json!({
            "apiVersion": "servicecatalog.k8s.io/v1beta1",
            "kind": "ClusterServicePlan",
            "metadata": {"name": "6a2b"},
            "spec": {
                "externalName": "shared",
                "clusterServiceClassRef": {"name": "4f6e"},
                "instanceCreateParameterSchema": {
                    "type": "object",
                    "properties": {"REALM": {"type": "string"}}
                }
            }
        });
        let plan: ClusterServicePlan = serde_json::from_value(json).unwrap();
        assert_eq!(plan.spec.external_name, "shared");
        let schema = plan.spec.instance_create_parameter_schema.unwrap();
        assert_eq!(schema["properties"]["REALM"]["type"], "string");
    }
}
