//! # Credential Store
//!
//! Request-scoped view of the browser's cookie jar.
//!
//! Reads come from the request's `Cookie` headers. Writes are recorded as pending `Set-Cookie`
//! values and only reach the browser once [`CredentialStore::apply`] copies them onto a response.
//! Whichever response ends up being returned, pass-through or redirect, must have them applied,
//! otherwise a refreshed session is lost and the next request refreshes again with a spent
//! refresh token.
//!
//! ## Cookies
//!
//! - `court-access-token`, `court-refresh-token`, `court-expires-at`: the session, 400 days
//! - `auth_next`: where to go after the OAuth callback, 10 minutes
//! - `court-code-verifier`: PKCE verifier for the OAuth callback, 10 minutes
use std::collections::HashMap;

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, SET_COOKIE},
};
use cookie::{Cookie, SameSite};
use time::Duration;
use tracing::warn;

use crate::identity::Session;

pub const ACCESS_TOKEN_COOKIE: &str = "court-access-token";
pub const REFRESH_TOKEN_COOKIE: &str = "court-refresh-token";
pub const EXPIRES_AT_COOKIE: &str = "court-expires-at";
pub const NEXT_COOKIE: &str = "auth_next";
pub const CODE_VERIFIER_COOKIE: &str = "court-code-verifier";

pub const SESSION_MAX_AGE: Duration = Duration::days(400);
pub const FLOW_MAX_AGE: Duration = Duration::minutes(10);

const SESSION_COOKIES: [&str; 3] = [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, EXPIRES_AT_COOKIE];

/// Session tokens as persisted in the browser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

impl SessionTokens {
    pub fn expires_within(&self, now: i64, margin: i64) -> bool {
        self.expires_at <= now.saturating_add(margin)
    }
}

#[derive(Debug, Default)]
pub struct CredentialStore {
    incoming: HashMap<String, String>,
    pending: Vec<Cookie<'static>>,
    secure: bool,
}

impl CredentialStore {
    pub fn from_headers(headers: &HeaderMap, secure: bool) -> Self {
        let incoming = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse_encoded)
            .filter_map(Result::ok)
            .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
            .collect();

        Self {
            incoming,
            pending: Vec::new(),
            secure,
        }
    }

    /// Current value, pending writes first.
    pub fn get(&self, name: &str) -> Option<&str> {
        match self.pending.iter().find(|cookie| cookie.name() == name) {
            Some(cookie) if is_removal(cookie) => None,
            Some(cookie) => Some(cookie.value()),
            None => self.incoming.get(name).map(String::as_str),
        }
    }

    pub fn set(&mut self, name: &str, value: &str, max_age: Duration) {
        let cookie = Cookie::build((name.to_string(), value.to_string()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(max_age)
            .build();

        self.write(cookie);
    }

    pub fn remove(&mut self, name: &str) {
        self.set(name, "", Duration::ZERO);
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Cookie<'static>> {
        self.pending.iter()
    }

    pub fn session(&self) -> Option<SessionTokens> {
        Some(SessionTokens {
            access_token: self.get(ACCESS_TOKEN_COOKIE)?.to_string(),
            refresh_token: self.get(REFRESH_TOKEN_COOKIE)?.to_string(),
            expires_at: self.get(EXPIRES_AT_COOKIE)?.parse().ok()?,
        })
    }

    pub fn store_session(&mut self, session: &Session) {
        self.set(ACCESS_TOKEN_COOKIE, &session.access_token, SESSION_MAX_AGE);
        self.set(REFRESH_TOKEN_COOKIE, &session.refresh_token, SESSION_MAX_AGE);
        self.set(EXPIRES_AT_COOKIE, &session.expires_at.to_string(), SESSION_MAX_AGE);
    }

    pub fn clear_session(&mut self) {
        for name in SESSION_COOKIES {
            self.remove(name);
        }
    }

    /// Copies pending writes onto a response.
    ///
    /// Cookies the response already sets are left alone: a handler that cleared the session
    /// outranks a refresh recorded earlier in the request.
    pub fn apply(&self, headers: &mut HeaderMap) {
        let already_set: Vec<String> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|raw| Cookie::parse_encoded(raw).ok())
            .map(|cookie| cookie.name().to_string())
            .collect();

        for cookie in &self.pending {
            if already_set.iter().any(|name| name == cookie.name()) {
                continue;
            }

            match HeaderValue::from_str(&cookie.encoded().to_string()) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(e) => warn!("Dropping unencodable cookie {}: {e}", cookie.name()),
            }
        }
    }

    /// Rewrites the forwarded request's `Cookie` header so handlers see pending writes.
    pub fn sync_request(&self, headers: &mut HeaderMap) {
        if !self.is_dirty() {
            return;
        }

        let mut current: HashMap<&str, &str> = self
            .incoming
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();

        for cookie in &self.pending {
            if is_removal(cookie) {
                current.remove(cookie.name());
            } else {
                current.insert(cookie.name(), cookie.value());
            }
        }

        let header = current
            .into_iter()
            .map(|(name, value)| Cookie::new(name, value).encoded().to_string())
            .collect::<Vec<_>>()
            .join("; ");

        headers.remove(COOKIE);
        if header.is_empty() {
            return;
        }

        match HeaderValue::from_str(&header) {
            Ok(value) => {
                headers.insert(COOKIE, value);
            }
            Err(e) => warn!("Failed to rewrite request cookies: {e}"),
        }
    }

    fn write(&mut self, cookie: Cookie<'static>) {
        self.pending.retain(|existing| existing.name() != cookie.name());
        self.pending.push(cookie);
    }
}

fn is_removal(cookie: &Cookie<'_>) -> bool {
    cookie.max_age() == Some(Duration::ZERO)
}
