//! # Hosted auth client
//!
//! [`AuthBackend`] over the hosted auth REST surface.
//!
//! | Call | Endpoint |
//! |------|----------|
//! | user | `GET /auth/v1/user` |
//! | refresh | `POST /auth/v1/token?grant_type=refresh_token` |
//! | exchange | `POST /auth/v1/token?grant_type=pkce` |
//! | sign out | `POST /auth/v1/logout` |
//! | authorize | `/auth/v1/authorize?provider=google` (browser redirect) |
//!
//! Every request carries the anon key in `apikey`. The client has a request timeout so a slow
//! provider cannot hold the session gate indefinitely.
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::{
    config::IdentityConfig,
    identity::{AuthBackend, IdentityError, Session, User},
};

const OAUTH_PROVIDER: &str = "google";
const DEFAULT_EXPIRES_IN: i64 = 3600;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self, now: i64) -> Session {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| now + self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN));

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

pub struct GoTrueBackend {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl GoTrueBackend {
    pub fn new(config: &IdentityConfig, timeout: Duration) -> Result<Self, IdentityError> {
        Url::parse(&config.url).map_err(|e| IdentityError::Misconfigured(format!("{}: {e}", config.url)))?;

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    async fn token(&self, grant_type: &str, body: serde_json::Value) -> Result<Session, IdentityError> {
        let response = self
            .client
            .post(format!("{}?grant_type={grant_type}", self.endpoint("token")))
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;

        let token: TokenResponse = check(response)?.json().await?;

        Ok(token.into_session(Utc::now().timestamp()))
    }
}

fn check(response: Response) -> Result<Response, IdentityError> {
    let status = response.status();

    if status.is_success() {
        Ok(response)
    } else {
        Err(IdentityError::Rejected(status.as_u16()))
    }
}

#[async_trait]
impl AuthBackend for GoTrueBackend {
    async fn user(&self, access_token: &str) -> Result<User, IdentityError> {
        let response = self
            .client
            .get(self.endpoint("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        Ok(check(response)?.json().await?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, IdentityError> {
        self.token("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<Session, IdentityError> {
        self.token(
            "pkce",
            json!({ "auth_code": code, "code_verifier": code_verifier }),
        )
        .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let response = self
            .client
            .post(self.endpoint("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        check(response)?;
        Ok(())
    }

    fn authorize_url(&self, redirect_to: &str, code_challenge: &str) -> String {
        let endpoint = self.endpoint("authorize");

        Url::parse_with_params(
            &endpoint,
            &[
                ("provider", OAUTH_PROVIDER),
                ("redirect_to", redirect_to),
                ("code_challenge", code_challenge),
                ("code_challenge_method", "plain"),
            ],
        )
        .map(String::from)
        .unwrap_or(endpoint)
    }
}
