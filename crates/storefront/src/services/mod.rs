//! Business logic services for the storefront.
//!
//! - `auth` - sign-in, sign-out, and token refresh around remote calls

pub mod auth;

pub use auth::{AuthError, AuthService, SignedIn};
