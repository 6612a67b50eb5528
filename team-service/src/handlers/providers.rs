//! Provider provisioning handlers.

use axum::{Json, extract::State, http::StatusCode};

use crate::AppState;
use crate::models::{ProvisionProviderRequest, ProvisionProviderResponse};
use crate::utils::ValidatedJson;
use service_core::error::AppError;

/// Provision a provider together with its owner user and membership.
///
/// POST /providers
#[tracing::instrument(skip_all)]
pub async fn provision_provider(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ProvisionProviderRequest>,
) -> Result<(StatusCode, Json<ProvisionProviderResponse>), AppError> {
    let response = state.team.provision_provider(req).await?;

    Ok((StatusCode::CREATED, Json(response)))
}
