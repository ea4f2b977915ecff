//! Session-related types.
//!
//! The session holds the visitor's cart key and, once signed in, the tokens
//! issued by the remote API. Everything else about the cart lives in the
//! cart cache.

/// Session keys.
pub mod keys {
    /// Key for the visitor's cart key (`CartKey`).
    pub const CART_KEY: &str = "cart_key";

    /// Key for the remote API tokens (`AuthTokens`).
    pub const AUTH_TOKENS: &str = "auth_tokens";
}
