//! Authentication service.
//!
//! Credentials are checked by the remote API; the storefront only keeps the
//! tokens it hands back, in the visitor session.

mod error;

pub use error::AuthError;

use std::future::Future;

use tower_sessions::Session;
use tracing::{info, instrument, warn};

use eastwest_core::{Email, FirstTimeDiscount};

use crate::api::{ApiClient, ApiError, AuthTokens};
use crate::cart::{CartAction, CartStore};
use crate::error::{clear_sentry_user, set_sentry_user};
use crate::middleware::{clear_auth_tokens, set_auth_tokens};

/// Result of a successful sign-in.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub tokens: AuthTokens,
    pub first_time_discount: FirstTimeDiscount,
}

/// Authentication service.
pub struct AuthService<'a> {
    api: &'a ApiClient,
    session: &'a Session,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(api: &'a ApiClient, session: &'a Session) -> Self {
        Self { api, session }
    }

    /// Sign in against the remote API and load the customer's first-time
    /// discount into the cart.
    ///
    /// The session id is cycled before the tokens are stored. A failed
    /// discount lookup is logged and treated as not eligible.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the remote rejects the login,
    /// `AuthError::Api` for other remote failures, or `AuthError::Session` if
    /// the session cannot be updated.
    #[instrument(skip(self, password, cart), fields(email = %email))]
    pub async fn sign_in(
        &self,
        email: &Email,
        password: &str,
        cart: &CartStore,
    ) -> Result<SignedIn, AuthError> {
        let tokens = self
            .api
            .sign_in(email, password)
            .await
            .map_err(|e| match e {
                ApiError::Unauthorized => AuthError::InvalidCredentials,
                other => AuthError::Api(other),
            })?;

        self.session.cycle_id().await?;
        set_auth_tokens(self.session, &tokens).await?;

        if let Some(customer) = &tokens.customer {
            set_sentry_user(&customer.id, Some(customer.email.as_str()));
        }

        let first_time_discount = match self.api.first_time_discount(&tokens).await {
            Ok(discount) => discount,
            Err(e) => {
                warn!(error = %e, "Failed to load first-time discount");
                FirstTimeDiscount::default()
            }
        };
        cart.dispatch(CartAction::SetFirstTimeDiscount(first_time_discount))
            .await;

        info!("Customer signed in");
        Ok(SignedIn {
            tokens,
            first_time_discount,
        })
    }

    /// Sign out: drop the tokens and empty the cart, which also clears its
    /// cart cache entry.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Session` if the session cannot be updated.
    #[instrument(skip(self, cart))]
    pub async fn sign_out(&self, cart: &CartStore) -> Result<(), AuthError> {
        clear_auth_tokens(self.session).await?;
        self.session.cycle_id().await?;
        clear_sentry_user();

        cart.dispatch(CartAction::Clear).await;
        cart.dispatch(CartAction::SetFirstTimeDiscount(
            FirstTimeDiscount::default(),
        ))
        .await;

        info!("Customer signed out");
        Ok(())
    }

    /// Run an authenticated call, refreshing the tokens once if the remote
    /// answers 401.
    ///
    /// If there is no refresh token, the refresh fails, or the retried call is
    /// rejected too, the tokens are removed from the session and
    /// `AuthError::SessionExpired` is returned.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionExpired` as above, `AuthError::Api` for any
    /// other failure of `call`, or `AuthError::Session` if the session cannot
    /// be updated.
    pub async fn with_refresh<T, F, Fut>(&self, tokens: AuthTokens, call: F) -> Result<T, AuthError>
    where
        F: Fn(AuthTokens) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        match call(tokens.clone()).await {
            Err(ApiError::Unauthorized) => {}
            other => return other.map_err(AuthError::Api),
        }

        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            return Err(self.expire().await);
        };

        let refreshed = match self.api.refresh(refresh_token).await {
            Ok(refreshed) => AuthTokens {
                customer: refreshed.customer.or(tokens.customer),
                ..refreshed
            },
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                return Err(self.expire().await);
            }
        };
        set_auth_tokens(self.session, &refreshed).await?;

        match call(refreshed).await {
            Err(ApiError::Unauthorized) => Err(self.expire().await),
            other => other.map_err(AuthError::Api),
        }
    }

    /// Like [`Self::with_refresh`] for calls where authentication is optional.
    ///
    /// # Errors
    ///
    /// See [`Self::with_refresh`]; without tokens, only `AuthError::Api`.
    pub async fn with_optional_refresh<T, F, Fut>(
        &self,
        tokens: Option<AuthTokens>,
        call: F,
    ) -> Result<T, AuthError>
    where
        F: Fn(Option<AuthTokens>) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        match tokens {
            Some(tokens) => self.with_refresh(tokens, |t| call(Some(t))).await,
            None => call(None).await.map_err(AuthError::Api),
        }
    }

    async fn expire(&self) -> AuthError {
        if let Err(e) = clear_auth_tokens(self.session).await {
            return AuthError::Session(e);
        }
        clear_sentry_user();
        info!("Session expired, tokens cleared");
        AuthError::SessionExpired
    }
}
