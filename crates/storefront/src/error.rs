//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Server-side failures are
//! captured to Sentry before the response is built; every response body is
//! JSON of the form `{"error": "..."}`.

use std::collections::BTreeMap;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::LOCATION, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use crate::api::ApiError;
use crate::cart::eligibility::Ineligible;
use crate::db::RepositoryError;
use crate::middleware::SIGN_IN_PATH;
use crate::services::auth::AuthError;

/// Field name to message, for 422 responses.
pub type FieldErrors = BTreeMap<&'static str, String>;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Remote storefront API call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Cart cache operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),

    /// Session store operation failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Authentication failed or the session expired.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Request fields failed validation.
    #[error("Validation failed: {0:?}")]
    Validation(FieldErrors),

    /// A coupon does not fit the cart.
    #[error("Coupon rejected: {0}")]
    CouponRejected(#[from] Ineligible),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Visitor is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The resource is mid-update and the request should be retried.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited, with the number of seconds to wait.
    #[error("Rate limited")]
    RateLimited(u64),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// A single-field validation error.
    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(BTreeMap::from([(field, message.into())]))
    }

    /// Session expiry, whether raised directly or by the remote API.
    const fn is_session_expired(&self) -> bool {
        matches!(self, Self::Auth(AuthError::SessionExpired))
    }

    const fn is_server_error(&self) -> bool {
        match self {
            Self::Storage(_)
            | Self::Session(_)
            | Self::Internal(_)
            | Self::Auth(AuthError::Session(_)) => true,
            Self::Api(err) | Self::Auth(AuthError::Api(err)) => is_upstream_failure(err),
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Storage(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Api(err) => api_status(err),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::SessionExpired => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::Api(err) => api_status(err),
                AuthError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::CouponRejected(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Client-facing message. Internal details are never exposed.
    fn message(&self) -> String {
        match self {
            Self::Storage(_) | Self::Session(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            Self::Api(err) => api_message(err),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid email or password".to_string(),
                AuthError::SessionExpired => "Session expired, please sign in again".to_string(),
                AuthError::Api(err) => api_message(err),
                AuthError::Session(_) => "Internal server error".to_string(),
            },
            Self::Validation(_) => "Validation failed".to_string(),
            Self::CouponRejected(reason) => capitalize(&reason.to_string()),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Unauthorized(msg) | Self::BadRequest(msg) | Self::Conflict(msg) => msg.clone(),
            Self::RateLimited(_) => "Too many requests, please try again shortly".to_string(),
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited(seconds)
            | Self::Api(ApiError::RateLimited(seconds))
            | Self::Auth(AuthError::Api(ApiError::RateLimited(seconds))) => Some(*seconds),
            _ => None,
        }
    }
}

/// Network, decoding, configuration, and unexpected-status failures.
const fn is_upstream_failure(err: &ApiError) -> bool {
    !matches!(
        err,
        ApiError::Unauthorized | ApiError::NotFound(_) | ApiError::RateLimited(_)
    )
}

fn api_status(err: &ApiError) -> StatusCode {
    match err {
        ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn api_message(err: &ApiError) -> String {
    match err {
        ApiError::Unauthorized => "Sign in required".to_string(),
        ApiError::NotFound(_) => "Not found".to_string(),
        ApiError::RateLimited(_) => "Too many requests, please try again shortly".to_string(),
        _ => "External service error".to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let status = self.status();
        let mut body = json!({ "error": self.message() });
        match &self {
            Self::Validation(fields) => {
                body["fields"] = json!(fields);
            }
            Self::CouponRejected(reason) => {
                body["reason"] = Value::String(reason_code(reason).to_string());
            }
            _ if self.is_session_expired() => {
                body["redirect"] = Value::String(SIGN_IN_PATH.to_string());
            }
            _ => {}
        }

        let mut response = (status, Json(body)).into_response();
        if self.is_session_expired() {
            response
                .headers_mut()
                .insert(LOCATION, HeaderValue::from_static(SIGN_IN_PATH));
        }
        if let Some(seconds) = self.retry_after()
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        response
    }
}

/// Stable machine-readable name for an ineligibility reason.
const fn reason_code(reason: &Ineligible) -> &'static str {
    match reason {
        Ineligible::EmptyCart => "empty_cart",
        Ineligible::Expired => "expired",
        Ineligible::BelowMinimum { .. } => "below_minimum",
        Ineligible::NoApplicableProducts => "no_applicable_products",
        Ineligible::ExcludedByFirstTimeDiscount => "excluded_by_first_time_discount",
        Ineligible::NotStackable => "not_stackable",
        Ineligible::Withdrawn => "withdrawn",
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("navigation", "Viewed product page", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use eastwest_core::Money;

    use super::*;

    async fn body_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("Product".to_string());
        assert_eq!(err.to_string(), "Not found: Product");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::NotFound("Cart line".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::invalid("quantity", "must be at least 1")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(AppError::CouponRejected(Ineligible::Expired)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Api(ApiError::Status {
                status: 500,
                message: "boom".to_string(),
            })),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AppError::Api(ApiError::NotFound("gone".to_string()))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Auth(AuthError::InvalidCredentials)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Conflict("Cart is updating".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::RateLimited(3)),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_validation_body_lists_fields() {
        let response = AppError::invalid("email", "is not a valid email address").into_response();
        let body = body_of(response).await;
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(body["fields"]["email"], "is not a valid email address");
    }

    #[tokio::test]
    async fn test_coupon_rejection_carries_reason() {
        let response = AppError::CouponRejected(Ineligible::BelowMinimum {
            minimum: Money::from_cents(5_000),
        })
        .into_response();
        let body = body_of(response).await;
        assert_eq!(body["reason"], "below_minimum");
        assert!(body["error"].as_str().unwrap().starts_with("Cart subtotal"));
    }

    #[tokio::test]
    async fn test_session_expiry_points_to_sign_in() {
        let response = AppError::Auth(AuthError::SessionExpired).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[LOCATION], SIGN_IN_PATH);
        let body = body_of(response).await;
        assert_eq!(body["redirect"], SIGN_IN_PATH);
    }

    #[tokio::test]
    async fn test_upstream_details_hidden() {
        let response = AppError::Api(ApiError::Status {
            status: 503,
            message: "db connection refused at 10.0.0.3".to_string(),
        })
        .into_response();
        let body = body_of(response).await;
        assert_eq!(body["error"], "External service error");
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = AppError::Api(ApiError::RateLimited(7)).into_response();
        assert_eq!(response.headers()[RETRY_AFTER], "7");
    }
}
