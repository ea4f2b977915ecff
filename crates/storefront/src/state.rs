//! Application state shared across handlers.

use std::sync::Arc;

use crate::api::{ApiClient, ApiError};
use crate::cart::{CartRegistry, CartStorage};
use crate::config::StorefrontConfig;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Carts are reached through the registry; there
/// is no ambient cart or client anywhere else.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    api: ApiClient,
    carts: CartRegistry,
}

impl AppState {
    /// Create the application state.
    ///
    /// The API client doubles as the coupon service for every cart's
    /// auto-apply middleware.
    ///
    /// # Errors
    ///
    /// Returns an error if the API client cannot be built.
    pub fn new(config: StorefrontConfig, storage: Arc<dyn CartStorage>) -> Result<Self, ApiError> {
        let api = ApiClient::new(&config.api)?;
        let carts = CartRegistry::new(storage, Arc::new(api.clone()), config.cart);

        Ok(Self {
            inner: Arc::new(AppStateInner { config, api, carts }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The remote storefront API client.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Live cart stores.
    #[must_use]
    pub fn carts(&self) -> &CartRegistry {
        &self.inner.carts
    }
}
