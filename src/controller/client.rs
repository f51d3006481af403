//! SharedServiceClient reconciliation
//!
//! Clients are only acknowledged: None → Accepted, nothing after that.

use kube::ResourceExt;
use tracing::{info, instrument};

use super::Context;
use crate::crd::{Phase, SharedServiceClient, SharedServiceClientStatus};
use crate::Error;

/// Acknowledge a new SharedServiceClient
#[instrument(skip(client, ctx), fields(client = %client.name_any()))]
pub async fn reconcile_client(client: &SharedServiceClient, ctx: &Context) -> Result<(), Error> {
    let phase = client.status.as_ref().map(|s| s.phase).unwrap_or_default();
    if phase != Phase::None {
        return Ok(());
    }

    let status = SharedServiceClientStatus {
        phase: Phase::Accepted,
        message: Some("Accepted".to_string()),
    };
    let namespace = client.namespace().unwrap_or_else(|| ctx.namespace.clone());
    ctx.status
        .patch_client_status(&namespace, &client.name_any(), &status)
        .await?;
    info!(phase = %Phase::Accepted, "Shared service client accepted");
    Ok(())
}
