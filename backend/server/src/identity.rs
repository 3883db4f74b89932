//! # Identity
//!
//! Resolves the signed-in user for a request, refreshing the session on the way when it has
//! expired.
//!
//! The remote provider sits behind [`AuthBackend`] so the refresh bookkeeping in [`Identity`] can
//! be exercised without a network.
//!
//! ## Lookup
//!
//! 1. No session cookies: anonymous
//! 2. Session expired (or within [`EXPIRY_MARGIN_SECS`]): exchange the refresh token, write the new
//!    session into the [`CredentialStore`]; a failed refresh clears the cookies and is anonymous
//! 3. Otherwise validate the access token with the provider; a failure is anonymous
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{credentials::CredentialStore, error::AppError};

pub const EXPIRY_MARGIN_SECS: i64 = 10;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Identity provider rejected the request with status {0}")]
    Rejected(u16),

    #[error("Identity provider misconfigured: {0}")]
    Misconfigured(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Protected handlers take `User` directly; the session gate has already put it in the request.
impl<S: Send + Sync> FromRequestParts<S> for User {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// Public handlers take `Option<User>`.
impl<S: Send + Sync> OptionalFromRequestParts<S> for User {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<User>().cloned())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub user: User,
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn user(&self, access_token: &str) -> Result<User, IdentityError>;

    async fn refresh(&self, refresh_token: &str) -> Result<Session, IdentityError>;

    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<Session, IdentityError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;

    fn authorize_url(&self, redirect_to: &str, code_challenge: &str) -> String;
}

#[derive(Clone)]
pub struct Identity {
    backend: Arc<dyn AuthBackend>,
}

impl Identity {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self { backend }
    }

    /// May rewrite `credentials` as a side effect.
    pub async fn current_user(&self, credentials: &mut CredentialStore) -> Option<User> {
        let tokens = credentials.session()?;

        if tokens.expires_within(Utc::now().timestamp(), EXPIRY_MARGIN_SECS) {
            return match self.backend.refresh(&tokens.refresh_token).await {
                Ok(session) => {
                    debug!(user = %session.user.id, "Refreshed session");
                    credentials.store_session(&session);
                    Some(session.user)
                }
                Err(e) => {
                    warn!("Session refresh failed: {e}");
                    credentials.clear_session();
                    None
                }
            };
        }

        self.backend
            .user(&tokens.access_token)
            .await
            .map_err(|e| {
                warn!("Identity lookup failed: {e}");
            })
            .ok()
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        credentials: &mut CredentialStore,
    ) -> Result<User, IdentityError> {
        let session = self.backend.exchange(code, code_verifier).await?;
        credentials.store_session(&session);

        Ok(session.user)
    }

    /// Best-effort with the provider; the cookies are cleared either way.
    pub async fn sign_out(&self, credentials: &mut CredentialStore) {
        if let Some(tokens) = credentials.session() {
            if let Err(e) = self.backend.sign_out(&tokens.access_token).await {
                warn!("Provider sign-out failed: {e}");
            }
        }

        credentials.clear_session();
    }

    pub fn authorize_url(&self, redirect_to: &str, code_challenge: &str) -> String {
        self.backend.authorize_url(redirect_to, code_challenge)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue, header::COOKIE};

    use super::*;
    use crate::{credentials::ACCESS_TOKEN_COOKIE, testutil::*};

    fn credentials(cookie: &str) -> CredentialStore {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());

        CredentialStore::from_headers(&headers, false)
    }

    #[tokio::test]
    async fn test_anonymous_without_cookies() {
        let identity = Identity::new(Arc::new(ScriptedAuth::new()));
        let mut store = CredentialStore::default();

        assert_eq!(identity.current_user(&mut store).await, None);
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn test_valid_session_is_not_refreshed() {
        let auth = ScriptedAuth::new().with_user("a1", user("u1", "a@columbia.edu"));
        let identity = Identity::new(Arc::new(auth));
        let mut store = credentials(&session_cookie("a1", "r1", in_an_hour()));

        assert_eq!(
            identity.current_user(&mut store).await,
            Some(user("u1", "a@columbia.edu"))
        );
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn test_expired_session_is_refreshed() {
        let refreshed = session("a2", "r2", in_an_hour(), user("u1", "a@columbia.edu"));
        let auth = ScriptedAuth::new().with_refresh("r1", refreshed);
        let identity = Identity::new(Arc::new(auth));
        let mut store = credentials(&session_cookie("a1", "r1", an_hour_ago()));

        let found = identity.current_user(&mut store).await;

        assert_eq!(found, Some(user("u1", "a@columbia.edu")));
        assert_eq!(store.get(ACCESS_TOKEN_COOKIE), Some("a2"));
        assert!(store.is_dirty());
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_session() {
        let identity = Identity::new(Arc::new(ScriptedAuth::new()));
        let mut store = credentials(&session_cookie("a1", "spent", an_hour_ago()));

        assert_eq!(identity.current_user(&mut store).await, None);
        assert_eq!(store.session(), None);
        assert_eq!(store.pending().count(), 3);
    }

    #[tokio::test]
    async fn test_rejected_access_token_is_anonymous() {
        let identity = Identity::new(Arc::new(ScriptedAuth::new()));
        let mut store = credentials(&session_cookie("revoked", "r1", in_an_hour()));

        assert_eq!(identity.current_user(&mut store).await, None);
    }

    #[tokio::test]
    async fn test_sign_out_clears_cookies() {
        let auth = Arc::new(ScriptedAuth::new());
        let identity = Identity::new(auth.clone());
        let mut store = credentials(&session_cookie("a1", "r1", in_an_hour()));

        identity.sign_out(&mut store).await;

        assert_eq!(store.session(), None);
        assert_eq!(auth.signed_out(), vec!["a1".to_string()]);
    }
}
