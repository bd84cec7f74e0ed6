//! Authentication middleware
//!
//! Bearer API key check for the `/api` routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::server::AppState;

/// Reject requests whose bearer key does not match the configured one
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if validate_api_key(provided, state.api_key.as_deref()) {
        Ok(next.run(request).await)
    } else {
        Err(ApiError::AuthFailed)
    }
}

/// With no key configured every request is allowed
pub fn validate_api_key(provided: Option<&str>, expected: Option<&str>) -> bool {
    match (provided, expected) {
        (Some(p), Some(e)) => constant_time_eq(p.as_bytes(), e.as_bytes()),
        (_, None) => true,
        (None, Some(_)) => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}
