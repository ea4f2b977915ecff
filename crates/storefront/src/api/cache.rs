//! Response cache for the remote API client.

use std::time::{Duration, Instant};

use moka::Expiry;

use eastwest_core::{Coupon, CouponCode, ProductId};

use super::types::{AddressCheck, Product};

/// Cache key for cacheable lookups.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Product(ProductId),
    Coupon(CouponCode),
    AddressDiscount(AddressCheck),
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<Product>),
    Coupon(Box<Coupon>),
    AddressDiscount(bool),
}

/// Per-entry lifetimes: catalog and address checks for 5 minutes, coupons for 1.
pub struct ResponseExpiry;

impl ResponseExpiry {
    pub const CATALOG_TTL: Duration = Duration::from_secs(300);
    pub const COUPON_TTL: Duration = Duration::from_secs(60);
}

impl Expiry<CacheKey, CacheValue> for ResponseExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(match value {
            CacheValue::Product(_) | CacheValue::AddressDiscount(_) => Self::CATALOG_TTL,
            CacheValue::Coupon(_) => Self::COUPON_TTL,
        })
    }
}
