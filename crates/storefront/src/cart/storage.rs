//! Cart cache backends.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;

use super::CartKey;
use super::action::PersistedCart;
use crate::db::{CartCacheRepository, RepositoryError};

/// Where carts are mirrored between requests and restarts.
#[async_trait]
pub trait CartStorage: Send + Sync {
    async fn load(&self, key: CartKey) -> Result<Option<PersistedCart>, RepositoryError>;

    async fn save(&self, key: CartKey, cart: &PersistedCart) -> Result<(), RepositoryError>;

    async fn clear(&self, key: CartKey) -> Result<(), RepositoryError>;
}

/// Cart cache in `storefront.cart_cache`.
#[derive(Clone)]
pub struct PgCartStorage {
    pool: PgPool,
}

impl PgCartStorage {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStorage for PgCartStorage {
    async fn load(&self, key: CartKey) -> Result<Option<PersistedCart>, RepositoryError> {
        CartCacheRepository::new(&self.pool).get(key).await
    }

    async fn save(&self, key: CartKey, cart: &PersistedCart) -> Result<(), RepositoryError> {
        CartCacheRepository::new(&self.pool).upsert(key, cart).await
    }

    async fn clear(&self, key: CartKey) -> Result<(), RepositoryError> {
        CartCacheRepository::new(&self.pool).delete(key).await?;
        Ok(())
    }
}

/// In-process cart cache for tests and local runs without a database.
#[derive(Debug, Default)]
pub struct MemoryCartStorage {
    carts: RwLock<HashMap<CartKey, PersistedCart>>,
}

impl MemoryCartStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored cart for a key, if any.
    pub async fn get(&self, key: CartKey) -> Option<PersistedCart> {
        self.carts.read().await.get(&key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.carts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.carts.read().await.is_empty()
    }
}

#[async_trait]
impl CartStorage for MemoryCartStorage {
    async fn load(&self, key: CartKey) -> Result<Option<PersistedCart>, RepositoryError> {
        Ok(self.get(key).await)
    }

    async fn save(&self, key: CartKey, cart: &PersistedCart) -> Result<(), RepositoryError> {
        self.carts.write().await.insert(key, cart.clone());
        Ok(())
    }

    async fn clear(&self, key: CartKey) -> Result<(), RepositoryError> {
        self.carts.write().await.remove(&key);
        Ok(())
    }
}
