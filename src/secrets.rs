//! Label-selected secret lookup
//!
//! Shared instances publish their configuration and credentials as secrets
//! labelled with `serviceName` and `serviceInstanceID`. Parameter resolution
//! and credential recording both locate secrets through [`SecretStore`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
#[cfg(test)]
use mockall::automock;
use tracing::warn;

use crate::deadline::with_deadline;
use crate::Error;

/// Label carrying the service type on published secrets
pub const SERVICE_NAME_LABEL: &str = "serviceName";

/// Label carrying the broker-facing instance ID on published secrets
pub const SERVICE_INSTANCE_ID_LABEL: &str = "serviceInstanceID";

/// A secret reduced to its name and UTF-8 data
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecretRecord {
    /// Secret name
    pub name: String,
    /// Decoded data entries; non UTF-8 values are dropped
    pub data: BTreeMap<String, String>,
}

/// Secret lookup by label selector
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// List secrets in `namespace` carrying every label in `labels`
    async fn find_by_labels(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<SecretRecord>, Error>;
}

/// Selector labels for secrets published by an instance of `service_type`
pub fn instance_secret_labels(service_type: &str, instance_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (SERVICE_NAME_LABEL.to_string(), service_type.to_string()),
        (SERVICE_INSTANCE_ID_LABEL.to_string(), instance_id.to_string()),
    ])
}

/// Find the one secret matching `labels`
///
/// Zero or several matches is a validation error. Missing or ambiguous
/// configuration is never defaulted.
pub async fn find_unique(
    store: &dyn SecretStore,
    namespace: &str,
    labels: &BTreeMap<String, String>,
) -> Result<SecretRecord, Error> {
    let mut secrets = store.find_by_labels(namespace, labels).await?;
    if secrets.len() != 1 {
        return Err(Error::validation(format!(
            "expected exactly one secret matching {} but found {}",
            label_selector(labels),
            secrets.len()
        )));
    }
    Ok(secrets.remove(0))
}

/// Render labels as a Kubernetes equality selector
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Secret store backed by the Kubernetes API
pub struct KubeSecretStore {
    client: Client,
    timeout: Duration,
}

impl KubeSecretStore {
    /// Create a store whose calls are each bounded by `timeout`
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn find_by_labels(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<SecretRecord>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(labels));
        let list = with_deadline(self.timeout, "list secrets", api.list(&params)).await?;
        Ok(list.items.iter().map(to_record).collect())
    }
}

fn to_record(secret: &Secret) -> SecretRecord {
    let name = secret.name_any();
    let mut data = BTreeMap::new();
    for (key, value) in secret.data.iter().flatten() {
        match String::from_utf8(value.0.clone()) {
            Ok(text) => {
                data.insert(key.clone(), text);
            }
            Err(_) => warn!(secret = %name, key = %key, "Skipping non UTF-8 secret value"),
        }
    }
    for (key, value) in secret.string_data.iter().flatten() {
        data.entry(key.clone()).or_insert_with(|| value.clone());
    }
    SecretRecord { name, data }
}
