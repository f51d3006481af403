//! SharedServiceSlice reconciliation
//!
//! A slice advances through `phase` and `action` together:
//!
//! | phase    | action       | refs set          | next step                |
//! |----------|--------------|-------------------|--------------------------|
//! | None     | -            | -                 | Accept                   |
//! | Accepted | ""           | -                 | Allocate shared instance |
//! | Accepted | ""           | shared            | Provision slice instance |
//! | Accepted | provisioning | shared, slice     | Wait for readiness       |
//! | Accepted | provisioned  | shared, slice     | Complete                 |
//! | Complete | provisioned  | shared, slice     | (steady state)           |
//!
//! Failed is terminal. Each call performs one step and persists it.

use std::collections::BTreeMap;

use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use super::Context;
use crate::capacity::slice_key;
use crate::crd::{Phase, SharedServiceSlice, SharedServiceSliceStatus, SliceAction};
use crate::provisioning::{build_slice_instance, select_shared_plan};
use crate::secrets::{instance_secret_labels, SecretRecord};
use crate::{Error, SHARED_INSTANCE_LABEL, SHARED_PLAN, SLICE_INSTANCE_LABEL};

/// The single advance a slice snapshot calls for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SliceStep {
    /// Record the slice as accepted
    Accept,
    /// Move to Failed with the given reason
    Reject(String),
    /// Allocate a place on a shared instance
    Allocate,
    /// Submit the slice's own instance carved from `shared_instance`
    Provision {
        /// Allocated shared ServiceInstance name
        shared_instance: String,
    },
    /// Check the slice instance for readiness
    AwaitReady {
        /// Slice ServiceInstance name
        slice_instance: String,
    },
    /// Record completion of an already provisioned slice
    Complete,
    /// Terminal or steady state; nothing to do
    Idle,
}

/// Decide the next step for a slice from its snapshot alone
pub fn decide_slice(slice: &SharedServiceSlice) -> SliceStep {
    let status = slice.current_status();

    match (status.phase, status.action) {
        (Phase::Failed, _) => return SliceStep::Idle,
        (Phase::Complete, SliceAction::Provisioned) => return SliceStep::Idle,
        (Phase::Accepted | Phase::Complete, _) => {}
        _ => {
            return match slice.spec.validate() {
                Ok(()) => SliceStep::Accept,
                Err(e) => SliceStep::Reject(e.to_string()),
            }
        }
    }

    match status.action {
        SliceAction::Provisioned => SliceStep::Complete,
        SliceAction::Provisioning => match status.slice_instance() {
            Some(instance) => SliceStep::AwaitReady {
                slice_instance: instance.to_string(),
            },
            None => SliceStep::Reject(
                "slice is provisioning without a slice instance reference".to_string(),
            ),
        },
        SliceAction::None => match status.shared_instance() {
            None => SliceStep::Allocate,
            Some(shared) => SliceStep::Provision {
                shared_instance: shared.to_string(),
            },
        },
    }
}

/// Reconcile a live slice by one step
#[instrument(skip(slice, ctx), fields(slice = %slice.name_any()))]
pub async fn reconcile_slice(slice: &SharedServiceSlice, ctx: &Context) -> Result<(), Error> {
    let step = decide_slice(slice);
    debug!(?step, "Reconciling slice");

    match step {
        SliceStep::Accept => {
            let status = slice
                .current_status()
                .phase(Phase::Accepted)
                .message("Accepted, waiting for shared instance capacity");
            persist(slice, &status, ctx).await?;
            info!(phase = %Phase::Accepted, "Slice accepted");
            Ok(())
        }
        SliceStep::Reject(reason) => fail(slice, Error::validation(reason), ctx).await,
        SliceStep::Allocate => allocate(slice, ctx).await,
        SliceStep::Provision { shared_instance } => provision(slice, &shared_instance, ctx).await,
        SliceStep::AwaitReady { slice_instance } => await_ready(slice, &slice_instance, ctx).await,
        SliceStep::Complete => {
            let status = slice
                .current_status()
                .phase(Phase::Complete)
                .message("Slice provisioned");
            persist(slice, &status, ctx).await?;
            info!(phase = %Phase::Complete, "Slice complete");
            Ok(())
        }
        SliceStep::Idle => Ok(()),
    }
}

async fn allocate(slice: &SharedServiceSlice, ctx: &Context) -> Result<(), Error> {
    let service_type = &slice.spec.service_type;
    let shared = match ctx.allocator.allocate(&slice_key(slice), service_type).await {
        Ok(shared) => shared,
        Err(e) => return settle(slice, e, ctx).await,
    };

    label(slice, SHARED_INSTANCE_LABEL, &shared, ctx).await?;

    let mut status = slice
        .current_status()
        .message(format!("Allocated onto shared instance {}", shared));
    status.shared_instance_ref = Some(shared.clone());
    persist(slice, &status, ctx).await?;
    info!(shared_instance = %shared, "Slice allocated");
    Ok(())
}

async fn provision(slice: &SharedServiceSlice, shared_instance: &str, ctx: &Context) -> Result<(), Error> {
    match submit_slice_instance(slice, shared_instance, ctx).await {
        Ok(slice_instance) => {
            label(slice, SLICE_INSTANCE_LABEL, &slice_instance, ctx).await?;

            let mut status = slice
                .current_status()
                .action(SliceAction::Provisioning)
                .message(format!("Provisioning slice instance {}", slice_instance));
            status.slice_instance_ref = Some(slice_instance.clone());
            persist(slice, &status, ctx).await?;
            info!(slice_instance = %slice_instance, "Slice instance submitted");
            Ok(())
        }
        Err(e) => settle(slice, e, ctx).await,
    }
}

/// Build and submit the slice's instance, returning its name
async fn submit_slice_instance(
    slice: &SharedServiceSlice,
    shared_instance: &str,
    ctx: &Context,
) -> Result<String, Error> {
    let parent = ctx
        .provisioning
        .get_instance(&ctx.namespace, shared_instance)
        .await?
        .ok_or_else(|| {
            Error::validation(format!(
                "shared instance {} no longer exists",
                shared_instance
            ))
        })?;

    let shared_instance_id = parent.spec.external_id.clone().ok_or_else(|| {
        Error::transient(
            "resolve shared instance",
            format!("shared instance {} has no external ID yet", shared_instance),
        )
    })?;
    let class_external_name = parent
        .spec
        .cluster_service_class_external_name
        .clone()
        .ok_or_else(|| {
            Error::validation(format!(
                "shared instance {} has no class external name",
                shared_instance
            ))
        })?;

    let plans = ctx.provisioning.list_plans(SHARED_PLAN).await?;
    let class_name = parent
        .spec
        .cluster_service_class_ref
        .as_ref()
        .map(|r| r.name.as_str());
    let plan = select_shared_plan(&plans, class_name)?;
    let schema = plan
        .spec
        .instance_create_parameter_schema
        .clone()
        .unwrap_or(serde_json::Value::Null);

    let parameters = ctx
        .params
        .build_parameters(slice, &shared_instance_id, &schema)
        .await?;

    let instance = build_slice_instance(
        slice,
        &class_external_name,
        class_name,
        parameters,
        &ctx.namespace,
    );
    let name = instance.name_any();
    ctx.provisioning.submit_instance(&instance).await?;
    Ok(name)
}

async fn await_ready(slice: &SharedServiceSlice, slice_instance: &str, ctx: &Context) -> Result<(), Error> {
    let Some(instance) = ctx
        .provisioning
        .get_instance(&ctx.namespace, slice_instance)
        .await?
    else {
        return Err(Error::transient(
            "await slice instance",
            format!("service instance {} not found yet", slice_instance),
        ));
    };

    if !instance.is_ready() {
        debug!(slice_instance = %slice_instance, "Slice instance not ready yet");
        return Ok(());
    }

    let credential = match credential_secret(slice, instance.spec.external_id.as_deref(), ctx).await {
        Ok(secret) => secret,
        Err(e) => return settle(slice, e, ctx).await,
    };

    let mut status = slice
        .current_status()
        .phase(Phase::Complete)
        .action(SliceAction::Provisioned)
        .message("Slice provisioned");
    status.credential_ref = Some(credential.name.clone());
    persist(slice, &status, ctx).await?;
    info!(credential = %credential.name, "Slice complete");
    Ok(())
}

/// Locate the secret the slice instance published its credentials in
async fn credential_secret(
    slice: &SharedServiceSlice,
    external_id: Option<&str>,
    ctx: &Context,
) -> Result<SecretRecord, Error> {
    let Some(external_id) = external_id else {
        return Err(Error::transient(
            "resolve slice credentials",
            "slice instance has no external ID yet",
        ));
    };

    let labels = instance_secret_labels(&slice.spec.service_type, external_id);
    let mut secrets = ctx.secrets.find_by_labels(&ctx.namespace, &labels).await?;
    match secrets.len() {
        1 => Ok(secrets.remove(0)),
        0 => Err(Error::transient(
            "resolve slice credentials",
            format!("no credential secret published for instance {} yet", external_id),
        )),
        n => Err(Error::validation(format!(
            "expected one credential secret for instance {} but found {}",
            external_id, n
        ))),
    }
}

/// Deprovision the slice instance of a deleted slice and release its capacity
///
/// Safe to repeat: an already-deleted instance counts as success.
#[instrument(skip(slice, ctx), fields(slice = %slice.name_any()))]
pub async fn deprovision_slice(slice: &SharedServiceSlice, ctx: &Context) -> Result<(), Error> {
    let status = slice.current_status();

    if let Some(instance) = status.slice_instance() {
        match ctx.provisioning.delete_instance(&ctx.namespace, instance).await {
            Ok(()) => info!(slice_instance = %instance, "Slice instance deprovisioned"),
            Err(e) if e.is_not_found() => debug!(slice_instance = %instance, "Slice instance already gone"),
            Err(e) => return Err(e),
        }
    }

    // A place may be held even when the status never recorded it
    if !ctx.allocator.release_slice(&slice_key(slice)).await {
        if let Some(shared) = status.shared_instance() {
            debug!(shared_instance = %shared, "Slice held no tracked capacity");
        }
    }
    Ok(())
}

/// Surface a retryable error, or record a terminal one as Failed
async fn settle(slice: &SharedServiceSlice, error: Error, ctx: &Context) -> Result<(), Error> {
    if error.is_retryable() {
        warn!(error = %error, "Slice step failed, waiting for redelivery");
        return Err(error);
    }
    fail(slice, error, ctx).await
}

async fn fail(slice: &SharedServiceSlice, error: Error, ctx: &Context) -> Result<(), Error> {
    let status = slice
        .current_status()
        .phase(Phase::Failed)
        .message(error.to_string());
    persist(slice, &status, ctx).await?;
    warn!(error = %error, "Slice failed");
    Err(error)
}

async fn label(slice: &SharedServiceSlice, key: &str, value: &str, ctx: &Context) -> Result<(), Error> {
    let labels = BTreeMap::from([(key.to_string(), value.to_string())]);
    ctx.status
        .patch_slice_labels(&namespace_of(slice, ctx), &slice.name_any(), &labels)
        .await
}

async fn persist(slice: &SharedServiceSlice, status: &SharedServiceSliceStatus, ctx: &Context) -> Result<(), Error> {
    ctx.status
        .patch_slice_status(&namespace_of(slice, ctx), &slice.name_any(), status)
        .await
}

fn namespace_of(slice: &SharedServiceSlice, ctx: &Context) -> String {
    slice.namespace().unwrap_or_else(|| ctx.namespace.clone())
}
