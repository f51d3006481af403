//! Drives the broker through its public API against an in-memory listing

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use shared_service_operator::broker::{
    plan_id, service_id, BindingRequest, BrokerController, CreateServiceInstanceRequest,
    SharedServiceBroker, SharedServiceLister,
};
use shared_service_operator::Error;

/// Lister over a mutable set of raw SharedService objects
#[derive(Default)]
struct StaticLister {
    items: Mutex<Vec<Value>>,
}

impl StaticLister {
    fn push(&self, item: Value) {
        self.items.lock().unwrap().push(item);
    }
}

#[async_trait]
impl SharedServiceLister for StaticLister {
    async fn list(&self) -> Result<Vec<Value>, Error> {
        Ok(self.items.lock().unwrap().clone())
    }
}

fn shared_service(name: &str, class: &str, ready: bool) -> Value {
    json!({
        "apiVersion": "aerogear.org/v1alpha1",
        "kind": "SharedService",
        "metadata": {"name": name, "namespace": "mobile"},
        "spec": {"image": format!("docker.io/aerogearcatalog/{}-apb", class), "classExternalName": class},
        "status": {"phase": if ready { "Complete" } else { "Provisioning" }, "ready": ready}
    })
}

#[tokio::test]
async fn story_catalog_follows_service_readiness() {
    let lister = Arc::new(StaticLister::default());
    lister.push(shared_service("keycloak", "keycloak", true));
    lister.push(shared_service("metrics", "metrics", false));
    let broker = SharedServiceBroker::new(lister.clone());

    let catalog = broker.catalog().await.unwrap();
    assert_eq!(catalog.services.len(), 1);
    assert_eq!(catalog.services[0].id, service_id("mobile", "keycloak"));

    // A newly ready service shows up on the next call, IDs unchanged
    lister.push(shared_service("sync", "sync", true));
    let catalog = broker.catalog().await.unwrap();
    let ids: Vec<_> = catalog.services.iter().map(|s| s.id.clone()).collect();
    assert_eq!(
        ids,
        vec![service_id("mobile", "keycloak"), service_id("mobile", "sync")]
    );
    for service in &catalog.services {
        assert_eq!(service.plans[0].id, plan_id(&service.id));
        assert!(service.bindable);
    }
}

#[tokio::test]
async fn story_instance_create_bind_remove() {
    let broker = SharedServiceBroker::new(Arc::new(StaticLister::default()));
    let request = CreateServiceInstanceRequest {
        service_id: service_id("mobile", "keycloak"),
        plan_id: plan_id(&service_id("mobile", "keycloak")),
        parameters: json!({"credentials": {"user": "admin", "password": "hunter2"}})
            .as_object()
            .cloned()
            .unwrap(),
    };

    broker.create_service_instance("abc", &request).await.unwrap();
    // Identical re-create is accepted
    broker.create_service_instance("abc", &request).await.unwrap();

    let binding = broker
        .bind("abc", "binding-1", &BindingRequest::default())
        .await
        .unwrap();
    assert_eq!(binding.credentials["user"], "admin");
    assert_eq!(binding.credentials["password"], "hunter2");

    broker.unbind("abc", "binding-1", "", "").await.unwrap();
    broker
        .remove_service_instance("abc", "", "", false)
        .await
        .unwrap();
    broker
        .remove_service_instance("abc", "", "", false)
        .await
        .unwrap();

    let err = broker
        .bind("abc", "binding-2", &BindingRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoSuchInstance { .. }));
}

#[tokio::test]
async fn test_concurrent_binds_read_the_same_credentials() {
    let broker = Arc::new(SharedServiceBroker::new(Arc::new(StaticLister::default())));
    broker
        .create_service_instance("abc", &CreateServiceInstanceRequest::default())
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .bind("abc", &format!("binding-{i}"), &BindingRequest::default())
                    .await
                    .unwrap()
                    .credentials
            })
        })
        .collect();

    let mut seen = Vec::new();
    for handle in handles {
        seen.push(handle.await.unwrap());
    }
    assert!(seen.windows(2).all(|pair| pair[0] == pair[1]));
}
