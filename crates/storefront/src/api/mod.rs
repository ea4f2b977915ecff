//! Client for the East West Offroad remote API.
//!
//! # Architecture
//!
//! - The remote service is the source of truth for prices, coupons, orders,
//!   and customer accounts; the storefront only mirrors cart state locally
//! - Plain JSON over HTTPS with `reqwest`
//! - In-memory caching via `moka` for product, coupon, and address lookups
//!
//! # Example
//!
//! ```rust,ignore
//! use eastwest_storefront::api::{ApiClient, CouponService};
//!
//! let client = ApiClient::new(&config.api)?;
//! let product = client.get_product(ProductId::new(42)).await?;
//! let offered = client.offered_coupons(&store.snapshot().quote()).await?;
//! ```

mod cache;
mod client;
pub mod types;

pub use client::ApiClient;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

use eastwest_core::Coupon;

/// Errors that can occur when calling the remote API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configured base URL cannot carry path segments.
    #[error("Invalid API base URL")]
    InvalidBaseUrl,

    /// The configured API key is not a valid header value.
    #[error("Invalid API key header value")]
    InvalidApiKey,

    /// The access token was rejected.
    #[error("Unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the remote service.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// Response status code.
        status: u16,
        /// The remote's `message` field, or a truncated body.
        message: String,
    },
}

impl ApiError {
    /// Whether the failure came from a rejected access token.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Source of the coupons the remote service currently offers for a cart.
///
/// The auto-apply middleware only depends on this seam, so tests drive it
/// with an in-process implementation.
#[async_trait]
pub trait CouponService: Send + Sync {
    /// Coupons offered for the given cart quote.
    async fn offered_coupons(&self, quote: &CartQuote) -> Result<Vec<Coupon>, ApiError>;
}

#[async_trait]
impl CouponService for ApiClient {
    async fn offered_coupons(&self, quote: &CartQuote) -> Result<Vec<Coupon>, ApiError> {
        self.eligible_coupons(quote).await
    }
}
