//! Broker backed by SharedService resources

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::{Client, ResourceExt};
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::instances::InstanceTable;
use super::types::{
    BindingRequest, Catalog, CreateServiceBindingResponse, CreateServiceInstanceRequest,
    CreateServiceInstanceResponse, Credentials, DeleteServiceInstanceResponse,
    LastOperationResponse, Service, ServicePlan,
};
use super::BrokerController;
use crate::crd::SharedService;
use crate::deadline::with_deadline;
use crate::{Error, SHARED_PLAN};

/// Parameter carrying caller-supplied instance credentials
const CREDENTIALS_PARAM: &str = "credentials";

/// UUIDv5 namespace for catalog IDs
const CATALOG_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a0e_5d4b_4c8e_9a3f_0b7d_e215_c4a9);

/// Lists SharedService resources as raw JSON
///
/// Raw values let the broker skip a malformed resource instead of failing
/// the whole listing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SharedServiceLister: Send + Sync {
    /// Every SharedService in scope
    async fn list(&self) -> Result<Vec<Value>, Error>;
}

/// Lister reading SharedServices from the Kubernetes API
pub struct KubeSharedServiceLister {
    api: Api<DynamicObject>,
    timeout: Duration,
}

impl KubeSharedServiceLister {
    /// List SharedServices in `namespace`, bounding each call by `timeout`
    pub fn new(client: Client, namespace: &str, timeout: Duration) -> Self {
        let resource = ApiResource::erase::<SharedService>(&());
        Self {
            api: Api::namespaced_with(client, namespace, &resource),
            timeout,
        }
    }
}

#[async_trait]
impl SharedServiceLister for KubeSharedServiceLister {
    async fn list(&self) -> Result<Vec<Value>, Error> {
        let list = with_deadline(
            self.timeout,
            "list shared services",
            self.api.list(&ListParams::default()),
        )
        .await?;
        list.items
            .into_iter()
            .map(|obj| serde_json::to_value(obj).map_err(Error::from))
            .collect()
    }
}

/// Stable catalog ID of the service offered for `namespace/name`
pub fn service_id(namespace: &str, name: &str) -> String {
    Uuid::new_v5(&CATALOG_NAMESPACE, format!("{}/{}", namespace, name).as_bytes()).to_string()
}

/// Stable catalog ID of the `shared` plan of `service_id`
pub fn plan_id(service_id: &str) -> String {
    Uuid::new_v5(
        &CATALOG_NAMESPACE,
        format!("{}/{}", service_id, SHARED_PLAN).as_bytes(),
    )
    .to_string()
}

/// Catalog entry for a SharedService, or None while it isn't ready
pub fn catalog_entry(service: &SharedService) -> Option<Service> {
    if !service.status.as_ref().is_some_and(|s| s.ready) {
        return None;
    }

    let namespace = service.namespace().unwrap_or_default();
    let name = service.name_any();
    let id = service_id(&namespace, &name);
    let service_type = match service.service_type() {
        "" => name.as_str(),
        t => t,
    };

    Some(Service {
        description: format!("Slice of the shared {} service", service_type),
        plans: vec![ServicePlan {
            name: SHARED_PLAN.to_string(),
            id: plan_id(&id),
            description: format!("A tenant slice of a shared {} instance", service_type),
            free: true,
            bindable: Some(true),
        }],
        bindable: true,
        name,
        id,
    })
}

/// Broker offering one catalog entry per ready SharedService
pub struct SharedServiceBroker {
    lister: Arc<dyn SharedServiceLister>,
    instances: InstanceTable,
}

impl SharedServiceBroker {
    /// Create a broker over `lister` with an empty instance table
    pub fn new(lister: Arc<dyn SharedServiceLister>) -> Self {
        Self {
            lister,
            instances: InstanceTable::new(),
        }
    }

    /// The broker's instance table
    pub fn instances(&self) -> &InstanceTable {
        &self.instances
    }
}

fn requested_credentials(request: &CreateServiceInstanceRequest) -> Result<Option<Credentials>, Error> {
    request
        .parameters
        .get(CREDENTIALS_PARAM)
        .map(|raw| {
            serde_json::from_value::<Credentials>(raw.clone()).map_err(|e| {
                Error::validation(format!(
                    "'{}' must map strings to strings: {}",
                    CREDENTIALS_PARAM, e
                ))
            })
        })
        .transpose()
}

fn default_credentials(instance_id: &str) -> Credentials {
    Credentials::from([
        ("username".to_string(), instance_id.to_string()),
        ("password".to_string(), Uuid::new_v4().simple().to_string()),
    ])
}

#[async_trait]
impl BrokerController for SharedServiceBroker {
    #[instrument(skip(self))]
    async fn catalog(&self) -> Result<Catalog, Error> {
        let listed = self.lister.list().await?;

        let mut services = Vec::new();
        for raw in listed {
            let name = raw
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>")
                .to_string();
            match serde_json::from_value::<SharedService>(raw) {
                Ok(service) => services.extend(catalog_entry(&service)),
                Err(e) => warn!(shared_service = %name, error = %e, "Skipping malformed shared service"),
            }
        }

        info!(services = services.len(), "Built catalog");
        Ok(Catalog { services })
    }

    async fn last_operation(
        &self,
        instance_id: &str,
        _service_id: &str,
        _plan_id: &str,
        _operation: &str,
    ) -> Result<LastOperationResponse, Error> {
        warn!(instance_id = %instance_id, "Last operation requested but not supported");
        Err(Error::unimplemented("GetServiceInstanceLastOperation"))
    }

    #[instrument(skip(self, request))]
    async fn create_service_instance(
        &self,
        instance_id: &str,
        request: &CreateServiceInstanceRequest,
    ) -> Result<CreateServiceInstanceResponse, Error> {
        let credentials = requested_credentials(request)?;
        let supplied = credentials.is_some();
        self.instances
            .create(instance_id, credentials, || default_credentials(instance_id))
            .await?;
        info!(instance_id = %instance_id, supplied_credentials = supplied, "Created service instance");
        Ok(CreateServiceInstanceResponse::default())
    }

    #[instrument(skip(self))]
    async fn remove_service_instance(
        &self,
        instance_id: &str,
        _service_id: &str,
        _plan_id: &str,
        _accepts_incomplete: bool,
    ) -> Result<DeleteServiceInstanceResponse, Error> {
        if self.instances.remove(instance_id).await {
            info!(instance_id = %instance_id, "Removed service instance");
        }
        Ok(DeleteServiceInstanceResponse::default())
    }

    #[instrument(skip(self, _request))]
    async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        _request: &BindingRequest,
    ) -> Result<CreateServiceBindingResponse, Error> {
        let credentials = self
            .instances
            .credentials(instance_id)
            .await
            .ok_or_else(|| Error::no_such_instance(instance_id))?;
        Ok(CreateServiceBindingResponse { credentials })
    }

    async fn unbind(
        &self,
        _instance_id: &str,
        _binding_id: &str,
        _service_id: &str,
        _plan_id: &str,
    ) -> Result<(), Error> {
        // Bindings carry no state of their own
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shared_service_json(name: &str, ready: bool) -> Value {
        json!({
            "apiVersion": "aerogear.org/v1alpha1",
            "kind": "SharedService",
            "metadata": {"name": name, "namespace": "mobile"},
            "spec": {"image": "docker.io/aerogearcatalog/keycloak-apb", "classExternalName": "keycloak"},
            "status": {"phase": "Complete", "ready": ready}
        })
    }

    fn broker_listing(items: Vec<Value>) -> SharedServiceBroker {
        let mut lister = MockSharedServiceLister::new();
        lister.expect_list().returning(move || Ok(items.clone()));
        SharedServiceBroker::new(Arc::new(lister))
    }

    fn create_request(params: Value) -> CreateServiceInstanceRequest {
        CreateServiceInstanceRequest {
            parameters: params.as_object().cloned().unwrap_or_default(),
            ..Default::default()
        }
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Story: the catalog offers exactly the ready shared services
    #[tokio::test]
    async fn story_catalog_lists_only_ready_services() {
        let broker = broker_listing(vec![
            shared_service_json("keycloak", true),
            shared_service_json("metrics", false),
        ]);

        let catalog = broker.catalog().await.unwrap();
        assert_eq!(catalog.services.len(), 1);
        let service = &catalog.services[0];
        assert_eq!(service.name, "keycloak");
        assert_eq!(service.id, service_id("mobile", "keycloak"));
        assert_eq!(service.plans.len(), 1);
        assert_eq!(service.plans[0].name, SHARED_PLAN);
        assert_eq!(service.plans[0].id, plan_id(&service.id));
    }

    /// Story: one malformed resource doesn't hide the others
    #[tokio::test]
    async fn story_malformed_service_is_skipped() {
        let broker = broker_listing(vec![
            json!({"metadata": {"name": "broken"}, "spec": {"image": 42}}),
            shared_service_json("keycloak", true),
        ]);

        let catalog = broker.catalog().await.unwrap();
        let names: Vec<_> = catalog.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["keycloak"]);
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let mut lister = MockSharedServiceLister::new();
        lister
            .expect_list()
            .returning(|| Err(Error::transient("list shared services", "connection refused")));
        let broker = SharedServiceBroker::new(Arc::new(lister));

        assert!(broker.catalog().await.unwrap_err().is_retryable());
    }

    #[test]
    fn test_catalog_ids_are_stable_and_distinct() {
        assert_eq!(service_id("mobile", "keycloak"), service_id("mobile", "keycloak"));
        assert_ne!(service_id("mobile", "keycloak"), service_id("other", "keycloak"));
        let id = service_id("mobile", "keycloak");
        assert_ne!(plan_id(&id), id);
    }

    // =========================================================================
    // Instance Lifecycle
    // =========================================================================

    /// Story: credentials given at creation come back on bind
    #[tokio::test]
    async fn story_create_then_bind_returns_supplied_credentials() {
        let broker = broker_listing(vec![]);
        broker
            .create_service_instance(
                "abc",
                &create_request(json!({"credentials": {"user": "admin", "pass": "s3cret"}})),
            )
            .await
            .unwrap();

        let bound = broker
            .bind("abc", "binding-1", &BindingRequest::default())
            .await
            .unwrap();
        assert_eq!(bound.credentials.get("user").map(String::as_str), Some("admin"));
        assert_eq!(bound.credentials.get("pass").map(String::as_str), Some("s3cret"));
    }

    /// Story: without credentials a default pair is synthesized
    #[tokio::test]
    async fn story_create_without_credentials_synthesizes_default() {
        let broker = broker_listing(vec![]);
        broker
            .create_service_instance("abc", &CreateServiceInstanceRequest::default())
            .await
            .unwrap();

        let bound = broker
            .bind("abc", "binding-1", &BindingRequest::default())
            .await
            .unwrap();
        assert_eq!(bound.credentials.get("username").map(String::as_str), Some("abc"));
        assert!(bound.credentials.get("password").is_some_and(|p| !p.is_empty()));
    }

    /// Story: bind fails for unknown and removed instances
    #[tokio::test]
    async fn story_bind_requires_a_live_instance() {
        let broker = broker_listing(vec![]);
        let err = broker
            .bind("never", "b", &BindingRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchInstance { .. }));
        assert_eq!(err.to_string(), "no such instance with ID never");

        broker
            .create_service_instance("abc", &CreateServiceInstanceRequest::default())
            .await
            .unwrap();
        broker
            .remove_service_instance("abc", "svc", "plan", false)
            .await
            .unwrap();
        let err = broker
            .bind("abc", "b", &BindingRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchInstance { .. }));
    }

    #[tokio::test]
    async fn test_non_string_credentials_are_rejected() {
        let broker = broker_listing(vec![]);
        let err = broker
            .create_service_instance("abc", &create_request(json!({"credentials": {"port": 8080}})))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(broker.instances().is_empty().await);
    }

    #[tokio::test]
    async fn test_conflicting_recreate_fails() {
        let broker = broker_listing(vec![]);
        broker
            .create_service_instance("abc", &create_request(json!({"credentials": {"user": "a"}})))
            .await
            .unwrap();
        let err = broker
            .create_service_instance("abc", &create_request(json!({"credentials": {"user": "b"}})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InstanceConflict { .. }));
    }

    #[tokio::test]
    async fn test_remove_unknown_and_unbind_always_succeed() {
        let broker = broker_listing(vec![]);
        broker
            .remove_service_instance("missing", "svc", "plan", true)
            .await
            .unwrap();
        broker.unbind("missing", "b", "svc", "plan").await.unwrap();
    }

    #[tokio::test]
    async fn test_last_operation_is_unimplemented() {
        let broker = broker_listing(vec![]);
        let err = broker
            .last_operation("abc", "svc", "plan", "provision")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unimplemented { .. }));
    }
}
