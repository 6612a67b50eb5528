use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use validator::Validate;

/// Json extractor that runs `validator` rules before the handler sees the
/// payload. Malformed bodies reject as 400, rule violations as 422.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Json parse error: {}", e)))?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}
