use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderName;

use crate::api::errors::ApiError;

pub(crate) const PRINCIPAL_HEADER: HeaderName = HeaderName::from_static("x-principal-id");

/// Caller identity, authenticated upstream and forwarded in `x-principal-id`.
pub(crate) struct Principal(pub(crate) String);

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .headers
            .get(&PRINCIPAL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ApiError::Unauthorized("Missing principal"))?;

        Ok(Principal(principal.to_string()))
    }
}
