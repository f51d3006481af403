//! SharedService reconciliation
//!
//! None → Accepted → Provisioning → Complete, with Failed reachable from any
//! non-terminal phase on a validation-class error. Complete and Failed are
//! terminal; clearing the status is the only way out of Failed.

use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use super::Context;
use crate::crd::{Phase, SharedService, SharedServiceStatus};
use crate::provisioning::{build_shared_instance, resolve_service_class};
use crate::Error;

/// The single advance a SharedService snapshot calls for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SharedServiceStep {
    /// Record the resource as accepted
    Accept,
    /// Move to Failed with the given reason
    Reject(String),
    /// Resolve the class and submit the backing instance
    Provision,
    /// Check the submitted instance for readiness
    AwaitReady {
        /// ServiceInstance name
        instance: String,
    },
    /// Terminal; nothing to do
    Idle,
}

/// Decide the next step for a SharedService from its snapshot alone
pub fn decide_shared_service(service: &SharedService) -> SharedServiceStep {
    let status = service.current_status();
    match status.phase {
        Phase::None => match service.spec.validate() {
            Ok(()) => SharedServiceStep::Accept,
            Err(e) => SharedServiceStep::Reject(e.to_string()),
        },
        Phase::Accepted => SharedServiceStep::Provision,
        Phase::Provisioning => match status.instance_ref.filter(|r| !r.is_empty()) {
            Some(instance) => SharedServiceStep::AwaitReady { instance },
            None => SharedServiceStep::Reject(
                "shared service is provisioning without an instance reference".to_string(),
            ),
        },
        Phase::Complete | Phase::Failed => SharedServiceStep::Idle,
    }
}

/// Reconcile a live SharedService by one step
#[instrument(skip(service, ctx), fields(shared_service = %service.name_any()))]
pub async fn reconcile_shared_service(service: &SharedService, ctx: &Context) -> Result<(), Error> {
    let step = decide_shared_service(service);
    debug!(?step, "Reconciling shared service");

    match step {
        SharedServiceStep::Accept => {
            let status = service
                .current_status()
                .phase(Phase::Accepted)
                .message("Accepted for provisioning");
            persist(service, &status, ctx).await?;
            info!(phase = %Phase::Accepted, "Shared service accepted");
            Ok(())
        }
        SharedServiceStep::Reject(reason) => fail(service, Error::validation(reason), ctx).await,
        SharedServiceStep::Provision => provision(service, ctx).await,
        SharedServiceStep::AwaitReady { instance } => await_ready(service, &instance, ctx).await,
        SharedServiceStep::Idle => Ok(()),
    }
}

async fn provision(service: &SharedService, ctx: &Context) -> Result<(), Error> {
    let namespace = namespace_of(service, ctx);

    let class = match resolve_service_class(ctx.provisioning.as_ref(), service).await {
        Ok(class) => class,
        Err(e) => return settle(service, e, ctx).await,
    };

    let instance = match build_shared_instance(service, &class, &namespace) {
        Ok(instance) => instance,
        Err(e) => return settle(service, e, ctx).await,
    };
    let instance_name = instance.name_any();

    if let Err(e) = ctx.provisioning.submit_instance(&instance).await {
        return settle(service, e, ctx).await;
    }

    let status = service
        .current_status()
        .phase(Phase::Provisioning)
        .instance_ref(&instance_name)
        .message(format!("Provisioning {} from class {}", instance_name, class.name_any()));
    persist(service, &status, ctx).await?;
    info!(instance = %instance_name, "Shared service instance submitted");
    Ok(())
}

async fn await_ready(service: &SharedService, instance: &str, ctx: &Context) -> Result<(), Error> {
    let namespace = namespace_of(service, ctx);
    let Some(backing) = ctx.provisioning.get_instance(&namespace, instance).await? else {
        return Err(Error::transient(
            "await shared instance",
            format!("service instance {} not found yet", instance),
        ));
    };

    if !backing.is_ready() {
        debug!(instance = %instance, "Shared service instance not ready yet");
        return Ok(());
    }

    let status = service
        .current_status()
        .phase(Phase::Complete)
        .ready(true)
        .message("Shared service instance is ready");
    persist(service, &status, ctx).await?;
    info!(instance = %instance, "Shared service complete");
    Ok(())
}

/// Deprovision the backing instance of a deleted SharedService
///
/// Safe to repeat: an already-deleted instance counts as success.
#[instrument(skip(service, ctx), fields(shared_service = %service.name_any()))]
pub async fn deprovision_shared_service(service: &SharedService, ctx: &Context) -> Result<(), Error> {
    let Some(instance) = service
        .status
        .as_ref()
        .and_then(|s| s.instance_ref.as_deref())
        .filter(|r| !r.is_empty())
    else {
        debug!("Shared service had no backing instance");
        return Ok(());
    };

    let namespace = namespace_of(service, ctx);
    match ctx.provisioning.delete_instance(&namespace, instance).await {
        Ok(()) => {
            info!(instance = %instance, "Shared service instance deprovisioned");
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Surface a transient error, or record a terminal one as Failed
async fn settle(service: &SharedService, error: Error, ctx: &Context) -> Result<(), Error> {
    if error.is_retryable() {
        warn!(error = %error, "Provisioning step failed, waiting for redelivery");
        return Err(error);
    }
    fail(service, error, ctx).await
}

async fn fail(service: &SharedService, error: Error, ctx: &Context) -> Result<(), Error> {
    let status = service
        .current_status()
        .phase(Phase::Failed)
        .message(error.to_string());
    persist(service, &status, ctx).await?;
    warn!(error = %error, "Shared service failed");
    Err(error)
}

async fn persist(service: &SharedService, status: &SharedServiceStatus, ctx: &Context) -> Result<(), Error> {
    ctx.status
        .patch_shared_service_status(&namespace_of(service, ctx), &service.name_any(), status)
        .await
}

fn namespace_of(service: &SharedService, ctx: &Context) -> String {
    service.namespace().unwrap_or_else(|| ctx.namespace.clone())
}
