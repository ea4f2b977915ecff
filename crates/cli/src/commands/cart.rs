//! Cart cache maintenance.

use chrono::{Duration, Utc};

use eastwest_storefront::db::CartCacheRepository;

use super::{CommandError, connect};

/// Delete carts not updated in the last `older_than_days` days.
pub async fn purge(older_than_days: u32) -> Result<(), CommandError> {
    let pool = connect().await?;
    let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));

    let removed = CartCacheRepository::new(&pool)
        .purge_older_than(cutoff)
        .await?;

    tracing::info!(removed, %cutoff, "Purged stale carts");
    Ok(())
}

/// Log the number of cached carts.
pub async fn count() -> Result<(), CommandError> {
    let pool = connect().await?;
    let total = CartCacheRepository::new(&pool).count().await?;

    tracing::info!(total, "Cached carts");
    Ok(())
}
