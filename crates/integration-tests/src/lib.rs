//! Integration tests for the East West Offroad storefront.
//!
//! Each test starts the storefront app on an ephemeral port against an
//! in-process [`StubRemote`] standing in for the remote storefront API.
//! Sessions live in a `MemoryStore` and carts in a `MemoryCartStorage`, so no
//! database is needed.
//!
//! ```bash
//! cargo test -p eastwest-integration-tests
//! ```

pub mod remote;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::Value;
use tower_sessions::MemoryStore;

use eastwest_storefront::cart::MemoryCartStorage;
use eastwest_storefront::config::{ApiConfig, CartConfig, StorefrontConfig};
use eastwest_storefront::middleware::session_layer;
use eastwest_storefront::routes;
use eastwest_storefront::state::AppState;

pub use remote::StubRemote;

/// Debounce used by default; short enough to keep tests quick.
pub const TEST_DEBOUNCE: Duration = Duration::from_millis(100);

const SETTLE_POLL: Duration = Duration::from_millis(20);
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// A running storefront plus a cookie-keeping client for one visitor.
pub struct TestContext {
    pub client: Client,
    pub base_url: String,
    pub remote: StubRemote,
    pub storage: Arc<MemoryCartStorage>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_debounce(TEST_DEBOUNCE).await
    }

    pub async fn with_debounce(coupon_debounce: Duration) -> Self {
        Self::start(StubRemote::new(), coupon_debounce).await
    }

    /// Start the storefront against an already configured remote.
    pub async fn start(remote: StubRemote, coupon_debounce: Duration) -> Self {
        let api_url = remote.spawn().await;
        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://unused"),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            base_url: "http://127.0.0.1".to_string(),
            api: ApiConfig::new(&api_url).expect("stub api url"),
            cart: CartConfig {
                coupon_debounce,
                ..CartConfig::default()
            },
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        };

        let storage = Arc::new(MemoryCartStorage::new());
        let sessions = session_layer(MemoryStore::default(), &config);
        let state = AppState::new(config, storage.clone()).expect("app state");
        let app = routes::app(state, sessions);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind storefront");
        let addr = listener.local_addr().expect("storefront address");
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("storefront server");
        });

        Self {
            client: visitor(),
            base_url: format!("http://{addr}"),
            remote,
            storage,
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// A client with its own cookie jar, i.e. a different visitor.
    #[must_use]
    pub fn second_visitor(&self) -> Client {
        visitor()
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.get_as(&self.client, path).await
    }

    pub async fn get_as(&self, client: &Client, path: &str) -> (StatusCode, Value) {
        read(client.get(self.url(path)).send().await.expect("GET")).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.post_as(&self.client, path, body).await
    }

    pub async fn post_as(&self, client: &Client, path: &str, body: Value) -> (StatusCode, Value) {
        read(
            client
                .post(self.url(path))
                .json(&body)
                .send()
                .await
                .expect("POST"),
        )
        .await
    }

    pub async fn delete(&self, path: &str) -> (StatusCode, Value) {
        read(
            self.client
                .delete(self.url(path))
                .send()
                .await
                .expect("DELETE"),
        )
        .await
    }

    /// Poll the cart until coupon reconciliation has gone idle.
    pub async fn settled_cart(&self) -> Value {
        let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
        loop {
            let (status, cart) = self.get("/cart").await;
            assert_eq!(status, StatusCode::OK, "GET /cart: {cart}");
            if cart["reconcile_status"] == "idle" {
                return cart;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "cart never settled: {cart}"
            );
            tokio::time::sleep(SETTLE_POLL).await;
        }
    }
}

/// A money field from a JSON body, for scale-insensitive comparison.
#[must_use]
pub fn money(value: &Value) -> Decimal {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| panic!("not a money value: {value}"))
}

/// An amount in cents as a `Decimal`.
#[must_use]
pub fn cents(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}

/// A complete shipping address in Utah.
#[must_use]
pub fn utah_address() -> Value {
    serde_json::json!({
        "name": "Casey Rider",
        "line1": "100 Canyon Rd",
        "city": "Moab",
        "state": "UT",
        "zip": "84532"
    })
}

fn visitor() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("reqwest client")
}

async fn read(response: reqwest::Response) -> (StatusCode, Value) {
    let status = response.status();
    let text = response.text().await.expect("response body");
    let body = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    (status, body)
}
