//! Fixtures shared by the server tests.
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::to_bytes,
    http::header::SET_COOKIE,
    response::Response,
};
use chrono::Utc;
use cookie::Cookie;
use ledger::{MemoryStore, Store};
use parking_lot::Mutex;

use crate::{
    config::{Config, LedgerBackend},
    identity::{AuthBackend, Identity, IdentityError, Session, User},
    state::AppState,
};

/// Identity backend answering from fixed tables.
///
/// Unknown tokens and codes are rejected with a 401.
#[derive(Default)]
pub struct ScriptedAuth {
    users: HashMap<String, User>,
    refreshes: HashMap<String, Session>,
    codes: HashMap<String, Session>,
    exchanged: Mutex<Vec<(String, String)>>,
    signed_out: Mutex<Vec<String>>,
}

impl ScriptedAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, access_token: &str, user: User) -> Self {
        self.users.insert(access_token.to_string(), user);
        self
    }

    pub fn with_refresh(mut self, refresh_token: &str, session: Session) -> Self {
        self.users
            .insert(session.access_token.clone(), session.user.clone());
        self.refreshes.insert(refresh_token.to_string(), session);
        self
    }

    pub fn with_code(mut self, code: &str, session: Session) -> Self {
        self.users
            .insert(session.access_token.clone(), session.user.clone());
        self.codes.insert(code.to_string(), session);
        self
    }

    /// `(code, verifier)` pairs seen by `exchange`.
    pub fn exchanged(&self) -> Vec<(String, String)> {
        self.exchanged.lock().clone()
    }

    pub fn signed_out(&self) -> Vec<String> {
        self.signed_out.lock().clone()
    }
}

#[async_trait]
impl AuthBackend for ScriptedAuth {
    async fn user(&self, access_token: &str) -> Result<User, IdentityError> {
        self.users
            .get(access_token)
            .cloned()
            .ok_or(IdentityError::Rejected(401))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, IdentityError> {
        self.refreshes
            .get(refresh_token)
            .cloned()
            .ok_or(IdentityError::Rejected(401))
    }

    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<Session, IdentityError> {
        self.exchanged
            .lock()
            .push((code.to_string(), code_verifier.to_string()));

        self.codes
            .get(code)
            .cloned()
            .ok_or(IdentityError::Rejected(401))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        self.signed_out.lock().push(access_token.to_string());
        Ok(())
    }

    fn authorize_url(&self, redirect_to: &str, code_challenge: &str) -> String {
        format!("https://auth.test/authorize?redirect_to={redirect_to}&code_challenge={code_challenge}")
    }
}

pub fn user(id: &str, email: &str) -> User {
    User {
        id: id.to_string(),
        email: Some(email.to_string()),
    }
}

pub fn session(access_token: &str, refresh_token: &str, expires_at: i64, user: User) -> Session {
    Session {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.to_string(),
        expires_at,
        user,
    }
}

/// Request `Cookie` header carrying a session.
pub fn session_cookie(access_token: &str, refresh_token: &str, expires_at: i64) -> String {
    format!(
        "court-access-token={access_token}; court-refresh-token={refresh_token}; court-expires-at={expires_at}"
    )
}

pub fn in_an_hour() -> i64 {
    Utc::now().timestamp() + 3600
}

pub fn an_hour_ago() -> i64 {
    Utc::now().timestamp() - 3600
}

pub fn test_state(identity: Option<Identity>, store: MemoryStore) -> Arc<AppState> {
    let config = Config {
        ledger_backend: LedgerBackend::Memory,
        secure_cookies: false,
        ..Config::default()
    };
    let store: Arc<dyn Store> = Arc::new(store);

    AppState::from_parts(config, identity, store)
}

/// `Set-Cookie` values on a response, by cookie name.
pub fn set_cookies(response: &Response) -> HashMap<String, String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| Cookie::parse_encoded(raw.to_string()).ok())
        .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
        .collect()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
