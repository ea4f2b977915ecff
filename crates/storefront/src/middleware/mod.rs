//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transaction)
//! 2. `TraceLayer` (request span from [`request_span`])
//! 3. Request ID (recorded on the request span)
//! 4. Security headers
//! 5. Session layer (tower-sessions)
//! 6. Rate limiting on sign-in only (governor)
//!
//! The cart and auth extractors run inside handlers and rely on the session
//! layer having run.

pub mod auth;
pub mod cart;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{OptionalAuth, RequireAuth, SIGN_IN_PATH, clear_auth_tokens, set_auth_tokens};
pub use cart::{CurrentCart, cart_key};
pub use rate_limit::auth_rate_limiter;
pub use request_id::{RequestId, request_id_middleware, request_span};
pub use security_headers::security_headers_middleware;
pub use session::{SESSION_COOKIE_NAME, create_session_layer, session_layer};
