//! Provisioning client for the Service Catalog
//!
//! The reconciler never talks to the catalog directly. It goes through the
//! [`ProvisioningClient`] trait so reconcile logic can be exercised against
//! mocks, and builds the ServiceInstance payloads with the helpers here.
//!
//! Instance names are derived from the owning resource's UID, so a
//! submission replayed after a crash targets the same object and is
//! absorbed as "already exists".

mod client;

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::api::ObjectMeta;
use kube::ResourceExt;
#[cfg(test)]
use mockall::automock;

use crate::crd::{
    ClusterObjectReference, ClusterServiceClass, ClusterServicePlan, ServiceInstance,
    ServiceInstanceSpec, SharedService, SharedServiceSlice,
};
use crate::{Error, DEFAULT_PLAN, MANAGED_BY_LABEL, OPERATOR_NAME, SHARED_PLAN};

pub use client::KubeProvisioningClient;

/// Maximum length of a generated instance name (DNS label)
const MAX_NAME_LEN: usize = 63;

/// Number of UID characters appended to generated names
const UID_SUFFIX_LEN: usize = 8;

/// Operations against the external provisioning system
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Get a ClusterServiceClass by name
    async fn get_service_class(&self, name: &str) -> Result<Option<ClusterServiceClass>, Error>;

    /// List all ClusterServiceClasses
    async fn list_service_classes(&self) -> Result<Vec<ClusterServiceClass>, Error>;

    /// List ClusterServicePlans with the given external name
    async fn list_plans(&self, external_name: &str) -> Result<Vec<ClusterServicePlan>, Error>;

    /// Create a ServiceInstance; an existing instance of the same name counts as success
    async fn submit_instance(&self, instance: &ServiceInstance) -> Result<(), Error>;

    /// Get a ServiceInstance, `None` if it doesn't exist
    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceInstance>, Error>;

    /// Delete a ServiceInstance; a missing instance counts as success
    async fn delete_instance(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Resolve the ClusterServiceClass a SharedService provisions from
///
/// An explicit `classRef` is looked up by name. Otherwise the first class
/// whose external name matches `classExternalName` wins.
pub async fn resolve_service_class(
    client: &dyn ProvisioningClient,
    service: &SharedService,
) -> Result<ClusterServiceClass, Error> {
    if let Some(class_ref) = service.spec.class_ref.as_deref().filter(|c| !c.is_empty()) {
        return client.get_service_class(class_ref).await?.ok_or_else(|| {
            Error::validation(format!("cluster service class '{}' not found", class_ref))
        });
    }

    let wanted = &service.spec.class_external_name;
    client
        .list_service_classes()
        .await?
        .into_iter()
        .find(|class| &class.spec.external_name == wanted)
        .ok_or_else(|| {
            Error::validation(format!(
                "could not find a matching cluster service class for: {}",
                wanted
            ))
        })
}

/// Pick the single `shared` plan belonging to `class_name`
///
/// Plans without a class reference are accepted so catalogs that don't
/// populate it still work.
pub fn select_shared_plan<'a>(
    plans: &'a [ClusterServicePlan],
    class_name: Option<&str>,
) -> Result<&'a ClusterServicePlan, Error> {
    let matching: Vec<_> = plans
        .iter()
        .filter(|plan| plan.spec.external_name == SHARED_PLAN)
        .filter(|plan| match (class_name, &plan.spec.cluster_service_class_ref) {
            (Some(class), Some(plan_class)) => plan_class.name == class,
            _ => true,
        })
        .collect();

    match matching.as_slice() {
        [plan] => Ok(*plan),
        [] => Err(Error::validation(format!(
            "no '{}' plan found for class {}",
            SHARED_PLAN,
            class_name.unwrap_or("<any>")
        ))),
        many => Err(Error::validation(format!(
            "expected exactly one '{}' plan for class {} but found {}",
            SHARED_PLAN,
            class_name.unwrap_or("<any>"),
            many.len()
        ))),
    }
}

/// Deterministic ServiceInstance name for an owner
///
/// The prefix is reduced to DNS label characters and the first eight UID
/// characters are appended. The result never exceeds 63 characters.
pub fn instance_name(prefix: &str, uid: &str) -> String {
    let suffix: String = uid
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(UID_SUFFIX_LEN)
        .collect();

    let mut base: String = prefix
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    base.truncate(MAX_NAME_LEN - UID_SUFFIX_LEN - 1);
    let base = base.trim_matches('-');

    match (base.is_empty(), suffix.is_empty()) {
        (true, true) => "instance".to_string(),
        (true, false) => format!("instance-{}", suffix),
        (false, true) => base.to_string(),
        (false, false) => format!("{}-{}", base, suffix),
    }
}

fn owner_uid<K: ResourceExt>(resource: &K) -> String {
    resource.uid().unwrap_or_else(|| resource.name_any())
}

fn managed_labels(owner_kind: &str, owner_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string()),
        (format!("aerogear.org/{}", owner_kind), owner_name.to_string()),
    ])
}

/// Build the ServiceInstance backing a SharedService
pub fn build_shared_instance(
    service: &SharedService,
    class: &ClusterServiceClass,
    namespace: &str,
) -> Result<ServiceInstance, Error> {
    if class.spec.external_name.is_empty() {
        return Err(Error::validation(format!(
            "cluster service class '{}' has no external name",
            class.name_any()
        )));
    }
    let service_name = service.name_any();
    let parameters = if service.spec.params.is_empty() {
        None
    } else {
        Some(serde_json::to_value(&service.spec.params)?)
    };

    Ok(ServiceInstance {
        metadata: ObjectMeta {
            name: Some(instance_name(&service_name, &owner_uid(service))),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels("shared-service", &service_name)),
            ..Default::default()
        },
        spec: ServiceInstanceSpec {
            cluster_service_class_external_name: Some(class.spec.external_name.clone()),
            cluster_service_plan_external_name: Some(DEFAULT_PLAN.to_string()),
            cluster_service_class_ref: Some(ClusterObjectReference {
                name: class.name_any(),
            }),
            parameters,
            external_id: None,
        },
        status: None,
    })
}

/// Build the ServiceInstance carved out of a shared instance for one slice
///
/// `class_name` pins the class of the parent instance when it is known.
pub fn build_slice_instance(
    slice: &SharedServiceSlice,
    class_external_name: &str,
    class_name: Option<&str>,
    parameters: serde_json::Map<String, serde_json::Value>,
    namespace: &str,
) -> ServiceInstance {
    let slice_name = slice.name_any();
    ServiceInstance {
        metadata: ObjectMeta {
            name: Some(instance_name(
                &format!("{}-{}", slice.spec.service_type, slice_name),
                &owner_uid(slice),
            )),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels("slice", &slice_name)),
            ..Default::default()
        },
        spec: ServiceInstanceSpec {
            cluster_service_class_external_name: Some(class_external_name.to_string()),
            cluster_service_plan_external_name: Some(SHARED_PLAN.to_string()),
            cluster_service_class_ref: class_name.map(|name| ClusterObjectReference {
                name: name.to_string(),
            }),
            parameters: Some(serde_json::Value::Object(parameters)),
            external_id: None,
        },
        status: None,
    }
}
