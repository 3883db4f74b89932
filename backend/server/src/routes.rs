use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use ledger::{Caption, CaptionId, LeaderboardRow, aggregate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    credentials::{CODE_VERIFIER_COOKIE, CredentialStore, FLOW_MAX_AGE, NEXT_COOKIE},
    error::AppError,
    gate::{LOGIN_ROUTE, safe_next},
    identity::User,
    state::AppState,
    utils::get_vote_from_body,
};

pub const CALLBACK_ROUTE: &str = "/auth/callback";

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn home_handler(user: User) -> Json<User> {
    Json(user)
}

pub async fn captions_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Caption>>, AppError> {
    let captions = state
        .store
        .captions()
        .await?
        .into_iter()
        .filter(|caption| caption.content.is_some())
        .collect();

    Ok(Json(captions))
}

/// Awaits the append; storage errors reach the caller.
pub async fn vote_handler(
    State(state): State<Arc<AppState>>,
    user: User,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let event = get_vote_from_body(state.store.as_ref(), &user, body).await?;
    state.votes.cast(event).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Validates, then appends in the background.
pub async fn swipe_handler(
    State(state): State<Arc<AppState>>,
    user: User,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let event = get_vote_from_body(state.store.as_ref(), &user, body).await?;
    state.votes.cast_detached(event);

    Ok(StatusCode::ACCEPTED)
}

#[derive(Serialize)]
pub struct Leaderboard {
    pub email: Option<String>,
    pub leaderboard: Vec<LeaderboardRow>,
}

pub async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
    viewer: Option<User>,
) -> Result<Json<Leaderboard>, AppError> {
    let snapshot = state.store.snapshot().await?;

    Ok(Json(Leaderboard {
        email: viewer.and_then(|user| user.email),
        leaderboard: aggregate(&snapshot.votes, &snapshot.caption_set()),
    }))
}

#[derive(Deserialize)]
pub struct LoginQuery {
    next: Option<String>,
}

#[derive(Serialize)]
pub struct Login {
    pub authorize_url: Option<String>,
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(identity) = state.identity.as_ref() else {
        return Json(Login { authorize_url: None }).into_response();
    };

    let mut credentials = CredentialStore::from_headers(&headers, state.config.secure_cookies);
    let verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());

    credentials.set(NEXT_COOKIE, safe_next(query.next.as_deref()), FLOW_MAX_AGE);
    credentials.set(CODE_VERIFIER_COOKIE, &verifier, FLOW_MAX_AGE);

    let redirect_to = format!("{}{CALLBACK_ROUTE}", state.config.site_url.trim_end_matches('/'));
    let authorize_url = identity.authorize_url(&redirect_to, &verifier);

    let mut response = Json(Login {
        authorize_url: Some(authorize_url),
    })
    .into_response();
    credentials.apply(response.headers_mut());

    response
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    next: Option<String>,
}

pub async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    let mut credentials = CredentialStore::from_headers(&headers, state.config.secure_cookies);

    let (Some(identity), Some(code)) = (state.identity.as_ref(), query.code.as_deref()) else {
        return Redirect::temporary(LOGIN_ROUTE).into_response();
    };

    let next = safe_next(credentials.get(NEXT_COOKIE).or(query.next.as_deref())).to_string();
    let verifier = credentials
        .get(CODE_VERIFIER_COOKIE)
        .unwrap_or_default()
        .to_string();

    credentials.remove(NEXT_COOKIE);
    credentials.remove(CODE_VERIFIER_COOKIE);

    let location = match identity.exchange_code(code, &verifier, &mut credentials).await {
        Ok(user) => {
            info!(user = %user.id, "Signed in");
            next
        }
        Err(e) => {
            warn!("Code exchange failed: {e}");
            LOGIN_ROUTE.to_string()
        }
    };

    let mut response = Redirect::temporary(&location).into_response();
    credentials.apply(response.headers_mut());

    response
}

pub async fn signout_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let mut credentials = CredentialStore::from_headers(&headers, state.config.secure_cookies);

    match state.identity.as_ref() {
        Some(identity) => identity.sign_out(&mut credentials).await,
        None => credentials.clear_session(),
    }

    let mut response = Redirect::temporary(LOGIN_ROUTE).into_response();
    credentials.apply(response.headers_mut());

    response
}

fn require_admin(user: &User, domain: &str) -> Result<(), AppError> {
    let suffix = format!("@{}", domain.to_ascii_lowercase());

    match &user.email {
        Some(email) if email.to_ascii_lowercase().ends_with(&suffix) => Ok(()),
        _ => {
            warn!(user = %user.id, "Admin access denied");
            Err(AppError::Forbidden)
        }
    }
}

#[derive(Serialize)]
pub struct Admin {
    pub email: Option<String>,
    pub captions: Vec<Caption>,
}

pub async fn admin_handler(State(state): State<Arc<AppState>>, user: User) -> Result<Json<Admin>, AppError> {
    require_admin(&user, &state.config.admin_email_domain)?;

    Ok(Json(Admin {
        email: user.email,
        captions: state.store.captions().await?,
    }))
}

#[derive(Deserialize)]
pub struct NewCaption {
    content: String,
    #[serde(default)]
    image_url: Option<String>,
}

pub async fn create_caption_handler(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(payload): Json<NewCaption>,
) -> Result<(StatusCode, Json<Caption>), AppError> {
    require_admin(&user, &state.config.admin_email_domain)?;

    let content = payload.content.trim();
    if content.is_empty() {
        return Err(AppError::MalformedPayload);
    }

    let image_url = payload.image_url.filter(|url| !url.trim().is_empty());
    let caption = state
        .store
        .insert_caption(content.to_string(), image_url)
        .await?;
    info!(caption = %caption.id, "Caption created");

    Ok((StatusCode::CREATED, Json(caption)))
}

pub async fn delete_caption_handler(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    require_admin(&user, &state.config.admin_email_domain)?;

    let id = CaptionId::from(id);
    if !state.store.delete_caption(&id).await? {
        return Err(AppError::CaptionNotFound(id));
    }
    info!(caption = %id, "Caption deleted");

    Ok(StatusCode::NO_CONTENT)
}
