//! Status persistence for the operator's resources
//!
//! Status is written with a JSON merge patch on the status subresource, so
//! concurrent writers are last-writer-wins.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::crd::{
    SharedService, SharedServiceClient, SharedServiceClientStatus, SharedServiceSlice,
    SharedServiceSliceStatus, SharedServiceStatus,
};
use crate::deadline::with_deadline;
use crate::{Error, OPERATOR_NAME};

/// Persistence of status (and mirrored labels) for the operator's resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Replace a SharedService's status
    async fn patch_shared_service_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SharedServiceStatus,
    ) -> Result<(), Error>;

    /// Replace a SharedServiceSlice's status
    async fn patch_slice_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SharedServiceSliceStatus,
    ) -> Result<(), Error>;

    /// Merge labels into a SharedServiceSlice's metadata
    async fn patch_slice_labels(
        &self,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), Error>;

    /// Replace a SharedServiceClient's status
    async fn patch_client_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SharedServiceClientStatus,
    ) -> Result<(), Error>;
}

/// Status store backed by the Kubernetes API
pub struct KubeStatusStore {
    client: Client,
    timeout: Duration,
}

impl KubeStatusStore {
    /// Create a store whose calls are each bounded by `timeout`
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn patch_status<K, S>(&self, namespace: &str, name: &str, status: &S) -> Result<(), Error>
    where
        K: kube::Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
        S: Serialize + Sync,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "status": status });
        with_deadline(
            self.timeout,
            "patch status",
            api.patch_status(name, &PatchParams::apply(OPERATOR_NAME), &Patch::Merge(&patch)),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StatusStore for KubeStatusStore {
    async fn patch_shared_service_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SharedServiceStatus,
    ) -> Result<(), Error> {
        self.patch_status::<SharedService, _>(namespace, name, status)
            .await
    }

    async fn patch_slice_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SharedServiceSliceStatus,
    ) -> Result<(), Error> {
        self.patch_status::<SharedServiceSlice, _>(namespace, name, status)
            .await
    }

    async fn patch_slice_labels(
        &self,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let api: Api<SharedServiceSlice> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "metadata": { "labels": labels } });
        with_deadline(
            self.timeout,
            "patch slice labels",
            api.patch(name, &PatchParams::apply(OPERATOR_NAME), &Patch::Merge(&patch)),
        )
        .await?;
        Ok(())
    }

    async fn patch_client_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SharedServiceClientStatus,
    ) -> Result<(), Error> {
        self.patch_status::<SharedServiceClient, _>(namespace, name, status)
            .await
    }
}
