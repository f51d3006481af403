//! Controllers for the shared-service resources
//!
//! Every watch event is routed by resource kind and deletion flag to one
//! of the state machines below. Each machine decides one step from the
//! snapshot alone, performs that step's single side effect, and persists
//! the outcome; the persisted change arrives as the next event.

mod client;
mod shared_service;
mod slice;
pub mod status;

use std::sync::Arc;

use kube::Client;
use tracing::{error, warn};

pub use client::reconcile_client;
pub use shared_service::{
    decide_shared_service, deprovision_shared_service, reconcile_shared_service,
    SharedServiceStep,
};
pub use slice::{decide_slice, deprovision_slice, reconcile_slice, SliceStep};
pub use status::{KubeStatusStore, StatusStore};

use crate::capacity::{CapacityAllocator, InventorySource, KubeInventory};
use crate::config::OperatorConfig;
use crate::params::ParamResolver;
use crate::provisioning::{KubeProvisioningClient, ProvisioningClient};
use crate::secrets::{KubeSecretStore, SecretStore};
use crate::watch::{Resource, ResourceEvent};
use crate::Error;

/// Controller context shared by every reconcile
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client, &config).build();
/// ```
pub struct Context {
    /// Service Catalog access
    pub provisioning: Arc<dyn ProvisioningClient>,
    /// Status persistence
    pub status: Arc<dyn StatusStore>,
    /// Label-selected secret lookup
    pub secrets: Arc<dyn SecretStore>,
    /// Slice capacity ledger
    pub allocator: Arc<CapacityAllocator>,
    /// Slice parameter resolution
    pub params: Arc<ParamResolver>,
    /// Namespace instances are provisioned into
    pub namespace: String,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, config: &OperatorConfig) -> ContextBuilder {
        ContextBuilder::new(client, config.clone())
    }

    /// Create a context for testing with mock collaborators
    ///
    /// Secret lookups and capacity inventory are unconfigured mocks; use
    /// [`Context::for_testing_with`] when a test reaches them.
    #[cfg(test)]
    pub fn for_testing(
        provisioning: Arc<dyn ProvisioningClient>,
        status: Arc<dyn StatusStore>,
        namespace: &str,
    ) -> Self {
        Self::for_testing_with(
            provisioning,
            status,
            Arc::new(crate::secrets::MockSecretStore::new()),
            Arc::new(crate::capacity::MockInventorySource::new()),
            namespace,
        )
    }

    /// Create a context for testing with every collaborator supplied
    #[cfg(test)]
    pub fn for_testing_with(
        provisioning: Arc<dyn ProvisioningClient>,
        status: Arc<dyn StatusStore>,
        secrets: Arc<dyn SecretStore>,
        inventory: Arc<dyn InventorySource>,
        namespace: &str,
    ) -> Self {
        Self::assemble(provisioning, status, secrets, inventory, namespace, None)
    }

    fn assemble(
        provisioning: Arc<dyn ProvisioningClient>,
        status: Arc<dyn StatusStore>,
        secrets: Arc<dyn SecretStore>,
        inventory: Arc<dyn InventorySource>,
        namespace: &str,
        fallback: Option<String>,
    ) -> Self {
        let allocator = CapacityAllocator::new(inventory, provisioning.clone(), namespace, fallback);
        let params = ParamResolver::new(secrets.clone(), namespace);
        Self {
            provisioning,
            status,
            secrets,
            allocator: Arc::new(allocator),
            params: Arc::new(params),
            namespace: namespace.to_string(),
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// Collaborators not overridden default to their Kubernetes-backed
/// implementations, each call bounded by the configured timeout.
pub struct ContextBuilder {
    client: Client,
    config: OperatorConfig,
    provisioning: Option<Arc<dyn ProvisioningClient>>,
    status: Option<Arc<dyn StatusStore>>,
    secrets: Option<Arc<dyn SecretStore>>,
    inventory: Option<Arc<dyn InventorySource>>,
}

impl ContextBuilder {
    fn new(client: Client, config: OperatorConfig) -> Self {
        Self {
            client,
            config,
            provisioning: None,
            status: None,
            secrets: None,
            inventory: None,
        }
    }

    /// Override the Service Catalog client
    pub fn provisioning_client(mut self, provisioning: Arc<dyn ProvisioningClient>) -> Self {
        self.provisioning = Some(provisioning);
        self
    }

    /// Override the status store
    pub fn status_store(mut self, status: Arc<dyn StatusStore>) -> Self {
        self.status = Some(status);
        self
    }

    /// Override the secret store
    pub fn secret_store(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Override the capacity inventory
    pub fn inventory(mut self, inventory: Arc<dyn InventorySource>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let timeout = self.config.call_timeout;
        let client = self.client;
        let namespace = self.config.namespace;

        let provisioning = self
            .provisioning
            .unwrap_or_else(|| Arc::new(KubeProvisioningClient::new(client.clone(), timeout)));
        let status = self
            .status
            .unwrap_or_else(|| Arc::new(KubeStatusStore::new(client.clone(), timeout)));
        let secrets = self
            .secrets
            .unwrap_or_else(|| Arc::new(KubeSecretStore::new(client.clone(), timeout)));
        let inventory = self.inventory.unwrap_or_else(|| {
            Arc::new(KubeInventory::new(
                client.clone(),
                namespace.clone(),
                self.config.default_capacity,
                timeout,
            ))
        });

        Context::assemble(
            provisioning,
            status,
            secrets,
            inventory,
            &namespace,
            self.config.fallback_shared_instance,
        )
    }
}

/// Reconcile one delivered event
///
/// Live resources advance by one step; deleted ones have their external
/// instances deprovisioned.
pub async fn reconcile(event: &ResourceEvent, ctx: &Context) -> Result<(), Error> {
    match (&event.resource, event.deleted) {
        (Resource::SharedService(service), false) => reconcile_shared_service(service, ctx).await,
        (Resource::SharedService(service), true) => deprovision_shared_service(service, ctx).await,
        (Resource::Slice(slice), false) => reconcile_slice(slice, ctx).await,
        (Resource::Slice(slice), true) => deprovision_slice(slice, ctx).await,
        (Resource::Client(client), false) => reconcile_client(client, ctx).await,
        (Resource::Client(_), true) => Ok(()),
    }
}

/// What happens to an event whose reconcile failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Retried when the watch or resync delivers the resource again
    AwaitRedelivery,
    /// Recorded on the resource; only an external change moves it on
    Terminal,
}

/// Classify and log a failed reconcile
pub fn error_policy(event: &ResourceEvent, error: &Error) -> ErrorDisposition {
    let resource = event.resource.key();
    if error.is_retryable() {
        warn!(
            %error,
            resource = %resource,
            kind = ?event.resource.kind(),
            "Reconcile failed, retrying on next delivery"
        );
        ErrorDisposition::AwaitRedelivery
    } else {
        error!(
            ?error,
            resource = %resource,
            kind = ?event.resource.kind(),
            "Reconcile failed"
        );
        ErrorDisposition::Terminal
    }
}
