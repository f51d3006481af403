//! Kubernetes-backed [`ProvisioningClient`]

use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

use super::ProvisioningClient;
use crate::crd::{ClusterServiceClass, ClusterServicePlan, ServiceInstance};
use crate::deadline::with_deadline;
use crate::Error;

/// Provisioning client talking to the Service Catalog API
pub struct KubeProvisioningClient {
    client: Client,
    timeout: Duration,
}

impl KubeProvisioningClient {
    /// Create a client whose calls are each bounded by `timeout`
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl ProvisioningClient for KubeProvisioningClient {
    async fn get_service_class(&self, name: &str) -> Result<Option<ClusterServiceClass>, Error> {
        let api: Api<ClusterServiceClass> = Api::all(self.client.clone());
        with_deadline(self.timeout, "get cluster service class", api.get_opt(name)).await
    }

    async fn list_service_classes(&self) -> Result<Vec<ClusterServiceClass>, Error> {
        let api: Api<ClusterServiceClass> = Api::all(self.client.clone());
        let list = with_deadline(
            self.timeout,
            "list cluster service classes",
            api.list(&ListParams::default()),
        )
        .await?;
        Ok(list.items)
    }

    async fn list_plans(&self, external_name: &str) -> Result<Vec<ClusterServicePlan>, Error> {
        let api: Api<ClusterServicePlan> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.externalName={}", external_name));
        let list = with_deadline(self.timeout, "list cluster service plans", api.list(&params)).await?;
        Ok(list.items)
    }

    async fn submit_instance(&self, instance: &ServiceInstance) -> Result<(), Error> {
        let namespace = instance
            .namespace()
            .ok_or_else(|| Error::validation("service instance has no namespace"))?;
        let name = instance.name_any();
        let api: Api<ServiceInstance> = Api::namespaced(self.client.clone(), &namespace);

        match with_deadline(
            self.timeout,
            "submit service instance",
            api.create(&PostParams::default(), instance),
        )
        .await
        {
            Ok(_) => {
                info!(instance = %name, namespace = %namespace, "Submitted service instance");
                Ok(())
            }
            Err(Error::Kube(kube::Error::Api(ae))) if ae.code == 409 => {
                debug!(instance = %name, "Service instance already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceInstance>, Error> {
        let api: Api<ServiceInstance> = Api::namespaced(self.client.clone(), namespace);
        with_deadline(self.timeout, "get service instance", api.get_opt(name)).await
    }

    async fn delete_instance(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<ServiceInstance> = Api::namespaced(self.client.clone(), namespace);
        match with_deadline(
            self.timeout,
            "delete service instance",
            api.delete(name, &DeleteParams::default()),
        )
        .await
        {
            Ok(_) => {
                info!(instance = %name, namespace = %namespace, "Deleted service instance");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(instance = %name, "Service instance already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
