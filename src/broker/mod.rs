//! Service-broker adapter over ready shared services
//!
//! [`BrokerController`] is the capability a broker transport drives; the
//! transport itself lives outside this crate. [`SharedServiceBroker`] is
//! the implementation backed by SharedService resources.

mod instances;
mod shared;
mod types;

use async_trait::async_trait;

pub use instances::{InstanceRecord, InstanceTable};
pub use shared::{
    catalog_entry, plan_id, service_id, KubeSharedServiceLister, SharedServiceBroker,
    SharedServiceLister,
};
pub use types::{
    BindingRequest, Catalog, CreateServiceBindingResponse, CreateServiceInstanceRequest,
    CreateServiceInstanceResponse, Credentials, DeleteServiceInstanceResponse,
    LastOperationResponse, LastOperationState, Service, ServicePlan,
};

#[cfg(test)]
pub use shared::MockSharedServiceLister;

use crate::Error;

/// Operations a service broker exposes
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait BrokerController: Send + Sync {
    /// Services on offer
    async fn catalog(&self) -> Result<Catalog, Error>;

    /// Progress of an asynchronous operation on an instance
    async fn last_operation(
        &self,
        instance_id: &str,
        service_id: &str,
        plan_id: &str,
        operation: &str,
    ) -> Result<LastOperationResponse, Error>;

    /// Create instance `instance_id`
    async fn create_service_instance(
        &self,
        instance_id: &str,
        request: &CreateServiceInstanceRequest,
    ) -> Result<CreateServiceInstanceResponse, Error>;

    /// Remove instance `instance_id`; removing an unknown instance succeeds
    async fn remove_service_instance(
        &self,
        instance_id: &str,
        service_id: &str,
        plan_id: &str,
        accepts_incomplete: bool,
    ) -> Result<DeleteServiceInstanceResponse, Error>;

    /// Bind to instance `instance_id`, returning its credentials
    async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        request: &BindingRequest,
    ) -> Result<CreateServiceBindingResponse, Error>;

    /// Remove a binding
    async fn unbind(
        &self,
        instance_id: &str,
        binding_id: &str,
        service_id: &str,
        plan_id: &str,
    ) -> Result<(), Error>;
}
