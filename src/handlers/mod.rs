pub mod bookings;
pub mod businesses;
pub mod calendar;
pub mod health;
pub mod messages;

use axum::http::HeaderMap;

use crate::errors::AppError;

/// Bearer-token gate for the business-facing surface. Real identity is an
/// external concern; one deployment token covers the dashboard endpoints.
pub fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}
