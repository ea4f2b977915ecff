//! Cart cache repository.
//!
//! Mirrors cart products, applied coupons, and shipping info per cart key.
//! Queries are built at runtime; the JSONB columns are decoded through
//! `sqlx::types::Json`.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use eastwest_core::{AppliedCoupon, CartLineItem, ShippingInfo};

use super::RepositoryError;
use crate::cart::{CartKey, PersistedCart};

/// Repository for cart cache rows.
pub struct CartCacheRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartCacheRepository<'a> {
    /// Create a new cart cache repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get the cached cart for a key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a JSONB column does not decode.
    pub async fn get(&self, key: CartKey) -> Result<Option<PersistedCart>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT products, coupons, shipping
            FROM storefront.cart_cache
            WHERE cart_key = $1
            ",
        )
        .bind(key.as_uuid())
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let corrupt =
            |e: sqlx::Error| RepositoryError::DataCorruption(format!("cart cache {key}: {e}"));
        let Json(items): Json<Vec<CartLineItem>> = row.try_get("products").map_err(corrupt)?;
        let Json(coupons): Json<Vec<AppliedCoupon>> = row.try_get("coupons").map_err(corrupt)?;
        let shipping: Option<Json<ShippingInfo>> = row.try_get("shipping").map_err(corrupt)?;

        Ok(Some(PersistedCart {
            items,
            coupons,
            shipping: shipping.map(|Json(s)| s),
        }))
    }

    /// Insert or replace the cached cart for a key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(&self, key: CartKey, cart: &PersistedCart) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.cart_cache (cart_key, products, coupons, shipping, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (cart_key) DO UPDATE
            SET products = EXCLUDED.products,
                coupons = EXCLUDED.coupons,
                shipping = EXCLUDED.shipping,
                updated_at = NOW()
            ",
        )
        .bind(key.as_uuid())
        .bind(Json(&cart.items))
        .bind(Json(&cart.coupons))
        .bind(cart.shipping.as_ref().map(Json))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Delete the cached cart for a key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, key: CartKey) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.cart_cache WHERE cart_key = $1")
            .bind(key.as_uuid())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete carts not updated since `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.cart_cache WHERE updated_at < $1")
            .bind(cutoff)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Number of cached carts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM storefront.cart_cache")
            .fetch_one(self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }
}

