//! `ApiClient` implementation.

use std::sync::Arc;

use moka::future::Cache;
use reqwest::header::{ACCEPT, COOKIE, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use eastwest_core::{Coupon, CouponCode, Email, FirstTimeDiscount, OrderId, ProductId};

use crate::config::ApiConfig;

use super::ApiError;
use super::cache::{CacheKey, CacheValue, ResponseExpiry};
use super::types::{
    AddressCheck, AddressDiscount, AuthTokens, CartQuote, CouponList, GuestCart, Order,
    OrderRequest, OrderTracking, PaymentIntent, PaymentIntentRequest, Product, RefreshRequest,
    SignInRequest, TaxQuote, TaxRequest,
};

/// Bodies are truncated to this many characters in logs and error messages.
const LOGGED_BODY_CHARS: usize = 500;

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the East West Offroad remote API.
///
/// Product and address lookups are cached for 5 minutes, coupon lookups for 1.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    cache: Cache<CacheKey, CacheValue>,
}

/// Error body shape used by the remote service.
#[derive(Deserialize)]
struct RemoteMessage {
    message: String,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not a valid header value or the
    /// HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(api_key.expose_secret())
                .map_err(|_| ApiError::InvalidApiKey)?;
            value.set_sensitive(true);
            headers.insert("x-api-key", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(5_000)
            .expire_after(ResponseExpiry)
            .build();

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.base_url.clone(),
                cache,
            }),
        })
    }

    /// Build an endpoint URL from percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidBaseUrl)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Attach both auth forms the remote accepts: a bearer header and a
    /// `token` cookie carrying the same access token.
    fn authorize(request: RequestBuilder, tokens: &AuthTokens) -> RequestBuilder {
        request
            .bearer_auth(&tokens.access_token)
            .header(COOKIE, format!("token={}", tokens.access_token))
    }

    fn authorize_optional(request: RequestBuilder, tokens: Option<&AuthTokens>) -> RequestBuilder {
        match tokens {
            Some(tokens) => Self::authorize(request, tokens),
            None => request,
        }
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        // Read the body as text first for better error diagnostics
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(
                remote_message(&body).unwrap_or_else(|| "resource not found".to_string()),
            ));
        }
        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %truncate(&body),
                "Remote API returned non-success status"
            );
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: remote_message(&body).unwrap_or_else(|| truncate(&body)),
            });
        }

        Ok(body)
    }

    /// Send a request and parse its JSON response.
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %truncate(&body),
                "Failed to parse remote API response"
            );
            ApiError::Parse(e)
        })
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Get a product by id. The returned price is authoritative for the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found or the API request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, ApiError> {
        let cache_key = CacheKey::Product(id);

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let url = self.endpoint(&["products", &id.to_string()])?;
        let product: Product = self.execute(self.inner.client.get(url)).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    // =========================================================================
    // Coupons
    // =========================================================================

    /// Coupons the remote service offers for the given cart quote.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, quote), fields(lines = quote.lines.len(), subtotal = %quote.subtotal))]
    pub async fn eligible_coupons(&self, quote: &CartQuote) -> Result<Vec<Coupon>, ApiError> {
        let url = self.endpoint(&["coupons", "eligible"])?;
        let list: CouponList = self
            .execute(self.inner.client.post(url).json(quote))
            .await?;
        debug!(offered = list.coupons.len(), "Fetched offered coupons");
        Ok(list.coupons)
    }

    /// Look up a coupon by code.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown codes, or an error if the API request fails.
    #[instrument(skip(self), fields(code = %code))]
    pub async fn get_coupon(&self, code: &CouponCode) -> Result<Coupon, ApiError> {
        let cache_key = CacheKey::Coupon(code.clone());

        if let Some(CacheValue::Coupon(coupon)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for coupon");
            return Ok(*coupon);
        }

        let url = self.endpoint(&["coupons", code.as_str()])?;
        let coupon: Coupon = self.execute(self.inner.client.get(url)).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Coupon(Box::new(coupon.clone())))
            .await;

        Ok(coupon)
    }

    // =========================================================================
    // Shipping, tax, discounts
    // =========================================================================

    /// Whether an address qualifies for the address-based discount.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, address), fields(zip = %address.zip, state = %address.state))]
    pub async fn check_address_discount(&self, address: &AddressCheck) -> Result<bool, ApiError> {
        let cache_key = CacheKey::AddressDiscount(address.clone());

        if let Some(CacheValue::AddressDiscount(eligible)) = self.inner.cache.get(&cache_key).await
        {
            debug!("Cache hit for address discount");
            return Ok(eligible);
        }

        let url = self.endpoint(&["shipping", "address-discount"])?;
        let result: AddressDiscount = self
            .execute(self.inner.client.post(url).json(address))
            .await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::AddressDiscount(result.eligible))
            .await;

        Ok(result.eligible)
    }

    /// The signed-in customer's first-time discount.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the token is rejected, or an error if the API request fails.
    #[instrument(skip(self, tokens))]
    pub async fn first_time_discount(
        &self,
        tokens: &AuthTokens,
    ) -> Result<FirstTimeDiscount, ApiError> {
        let url = self.endpoint(&["discounts", "first-time"])?;
        self.execute(Self::authorize(self.inner.client.get(url), tokens))
            .await
    }

    /// Calculate tax for an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, request, tokens), fields(state = %request.address.state))]
    pub async fn calculate_tax(
        &self,
        request: &TaxRequest,
        tokens: Option<&AuthTokens>,
    ) -> Result<TaxQuote, ApiError> {
        let url = self.endpoint(&["tax", "calculate"])?;
        self.execute(Self::authorize_optional(
            self.inner.client.post(url).json(request),
            tokens,
        ))
        .await
    }

    // =========================================================================
    // Guest carts
    // =========================================================================

    /// Save a cart remotely under an email address.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, cart), fields(items = cart.items.len()))]
    pub async fn save_guest_cart(&self, cart: &GuestCart) -> Result<GuestCart, ApiError> {
        let url = self.endpoint(&["guest-carts"])?;
        self.execute(self.inner.client.post(url).json(cart)).await
    }

    /// Fetch the guest cart saved under an email address.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no cart is saved, or an error if the API request fails.
    #[instrument(skip(self, email))]
    pub async fn get_guest_cart(&self, email: &Email) -> Result<GuestCart, ApiError> {
        let url = self.endpoint(&["guest-carts", email.as_str()])?;
        self.execute(self.inner.client.get(url)).await
    }

    /// Replace the guest cart saved under an email address.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, cart), fields(items = cart.items.len()))]
    pub async fn update_guest_cart(&self, cart: &GuestCart) -> Result<GuestCart, ApiError> {
        let url = self.endpoint(&["guest-carts", cart.email.as_str()])?;
        self.execute(self.inner.client.put(url).json(cart)).await
    }

    /// Delete the guest cart saved under an email address.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, email))]
    pub async fn delete_guest_cart(&self, email: &Email) -> Result<(), ApiError> {
        let url = self.endpoint(&["guest-carts", email.as_str()])?;
        self.send(self.inner.client.delete(url)).await?;
        Ok(())
    }

    // =========================================================================
    // Payments and orders
    // =========================================================================

    /// Create a payment intent for the checkout total.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, request, tokens), fields(amount = %request.amount))]
    pub async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
        tokens: Option<&AuthTokens>,
    ) -> Result<PaymentIntent, ApiError> {
        let url = self.endpoint(&["payments", "intents"])?;
        self.execute(Self::authorize_optional(
            self.inner.client.post(url).json(request),
            tokens,
        ))
        .await
    }

    /// Save a paid order.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, request, tokens), fields(total = %request.total))]
    pub async fn create_order(
        &self,
        request: &OrderRequest,
        tokens: Option<&AuthTokens>,
    ) -> Result<Order, ApiError> {
        let url = self.endpoint(&["orders"])?;
        self.execute(Self::authorize_optional(
            self.inner.client.post(url).json(request),
            tokens,
        ))
        .await
    }

    /// Fetch one of the signed-in customer's orders.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized`, `NotFound`, or an error if the API request fails.
    #[instrument(skip(self, tokens), fields(order_id = %id))]
    pub async fn get_order(&self, id: OrderId, tokens: &AuthTokens) -> Result<Order, ApiError> {
        let url = self.endpoint(&["orders", &id.to_string()])?;
        self.execute(Self::authorize(self.inner.client.get(url), tokens))
            .await
    }

    /// Track an order by number and the email it was placed with.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown orders, or an error if the API request fails.
    #[instrument(skip(self, email), fields(number = %number))]
    pub async fn track_order(
        &self,
        number: &str,
        email: &Email,
    ) -> Result<OrderTracking, ApiError> {
        let mut url = self.endpoint(&["orders", "track"])?;
        url.query_pairs_mut()
            .append_pair("number", number)
            .append_pair("email", email.as_str());
        self.execute(self.inner.client.get(url)).await
    }

    // =========================================================================
    // Auth
    // =========================================================================

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for bad credentials, or an error if the API request fails.
    #[instrument(skip(self, email, password))]
    pub async fn sign_in(&self, email: &Email, password: &str) -> Result<AuthTokens, ApiError> {
        let url = self.endpoint(&["auth", "sign-in"])?;
        let body = SignInRequest {
            email: email.as_str(),
            password,
        };
        self.execute(self.inner.client.post(url).json(&body)).await
    }

    /// Exchange a refresh token for new tokens.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the refresh token is rejected, or an error if
    /// the API request fails.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, ApiError> {
        let url = self.endpoint(&["auth", "refresh"])?;
        let body = RefreshRequest { refresh_token };
        self.execute(self.inner.client.post(url).json(&body)).await
    }
}

fn remote_message(body: &str) -> Option<String> {
    serde_json::from_str::<RemoteMessage>(body)
        .ok()
        .map(|m| m.message)
        .filter(|m| !m.is_empty())
}

fn truncate(body: &str) -> String {
    body.chars().take(LOGGED_BODY_CHARS).collect()
}
