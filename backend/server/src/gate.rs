//! # Session Gate
//!
//! Middleware run on every request before any handler.
//!
//! 1. Classify the path as public or protected by prefix against [`PUBLIC_ROUTES`]
//! 2. Without an identity backend: public passes, protected goes to [`LOGIN_ROUTE`]
//! 3. Otherwise resolve the user, which may refresh the session and rewrite cookies
//! 4. Decide, and only then build the response
//!
//! | user | route | action |
//! |------|-------|--------|
//! | no | protected | redirect to login with `next` set to the requested path |
//! | yes | login | redirect home |
//! | else | | pass through |
//!
//! A redirect is a brand new response. Cookies written during step 3 are copied onto whichever
//! response is returned, redirect included.
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;
use url::form_urlencoded;

use crate::{credentials::CredentialStore, identity::User, state::AppState};

pub const PUBLIC_ROUTES: [&str; 4] = ["/login", "/auth/callback", "/votes", "/health"];
pub const LOGIN_ROUTE: &str = "/login";
pub const HOME_ROUTE: &str = "/";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Public,
    Protected,
}

impl Route {
    pub fn classify(path: &str) -> Self {
        if PUBLIC_ROUTES.iter().any(|route| path.starts_with(route)) {
            Route::Public
        } else {
            Route::Protected
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    Login { next: String },
    Home,
    Pass,
}

pub fn decide(user: Option<&User>, route: Route, path: &str) -> Decision {
    match (user, route) {
        (None, Route::Protected) => Decision::Login {
            next: path.to_string(),
        },
        (Some(_), _) if path == LOGIN_ROUTE => Decision::Home,
        _ => Decision::Pass,
    }
}

/// Post-login destination, limited to same-origin paths.
pub fn safe_next(raw: Option<&str>) -> &str {
    match raw {
        Some(next) if next.starts_with('/') && !next.starts_with("//") && !next.starts_with("/\\") => {
            next
        }
        _ => HOME_ROUTE,
    }
}

pub fn login_location(next: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();

    format!("{LOGIN_ROUTE}?{query}")
}

pub async fn session_gate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let route = Route::classify(&path);

    let Some(identity) = state.identity.as_ref() else {
        return match route {
            Route::Public => next.run(request).await,
            Route::Protected => Redirect::temporary(LOGIN_ROUTE).into_response(),
        };
    };

    let mut credentials = CredentialStore::from_headers(request.headers(), state.config.secure_cookies);
    let user = identity.current_user(&mut credentials).await;

    let mut response = match decide(user.as_ref(), route, &path) {
        Decision::Login { next } => {
            debug!(%path, "Redirecting anonymous request to login");
            Redirect::temporary(&login_location(&next)).into_response()
        }
        Decision::Home => Redirect::temporary(HOME_ROUTE).into_response(),
        Decision::Pass => {
            credentials.sync_request(request.headers_mut());
            if let Some(user) = user {
                request.extensions_mut().insert(user);
            }

            next.run(request).await
        }
    };

    credentials.apply(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{
            Request, StatusCode,
            header::{COOKIE, LOCATION},
        },
    };
    use ledger::MemoryStore;
    use tower::ServiceExt;

    use super::*;
    use crate::{identity::Identity, router, testutil::*};

    fn location(response: &Response) -> &str {
        response.headers().get(LOCATION).unwrap().to_str().unwrap()
    }

    fn get(path: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }

        builder.body(Body::empty()).unwrap()
    }

    fn gated(auth: ScriptedAuth) -> Arc<AppState> {
        test_state(Some(Identity::new(Arc::new(auth))), MemoryStore::new())
    }

    #[test]
    fn test_classify() {
        assert_eq!(Route::classify("/login"), Route::Public);
        assert_eq!(Route::classify("/auth/callback"), Route::Public);
        assert_eq!(Route::classify("/votes"), Route::Public);
        assert_eq!(Route::classify("/votes/live"), Route::Public);
        assert_eq!(Route::classify("/"), Route::Protected);
        assert_eq!(Route::classify("/captions"), Route::Protected);
        assert_eq!(Route::classify("/auth/signout"), Route::Protected);
        assert_eq!(Route::classify("/admin"), Route::Protected);
    }

    #[test]
    fn test_decide() {
        let someone = user("u1", "a@columbia.edu");

        assert_eq!(
            decide(None, Route::Protected, "/admin"),
            Decision::Login {
                next: "/admin".to_string()
            }
        );
        assert_eq!(decide(None, Route::Public, "/login"), Decision::Pass);
        assert_eq!(decide(Some(&someone), Route::Public, "/login"), Decision::Home);
        assert_eq!(decide(Some(&someone), Route::Public, "/login/extra"), Decision::Pass);
        assert_eq!(decide(Some(&someone), Route::Protected, "/admin"), Decision::Pass);
    }

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/admin")), "/admin");
        assert_eq!(safe_next(Some("/votes?x=1")), "/votes?x=1");
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("/\\evil.example")), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn test_login_location_round_trips_next() {
        let location = login_location("/admin/captions");
        let query = location.strip_prefix("/login?").unwrap();
        let next: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes()).into_owned().collect();

        assert_eq!(next, vec![("next".to_string(), "/admin/captions".to_string())]);
    }

    #[tokio::test]
    async fn test_protected_without_user_redirects_with_next() {
        let app = router(gated(ScriptedAuth::new()));

        for path in ["/", "/captions", "/admin", "/auth/signout"] {
            let response = app.clone().oneshot(get(path, None)).await.unwrap();

            assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
            assert_eq!(location(&response), login_location(path));
        }
    }

    #[tokio::test]
    async fn test_unconfigured_backend_degrades_to_public_only() {
        let app = router(test_state(None, MemoryStore::new()));

        let protected = app.clone().oneshot(get("/captions", None)).await.unwrap();
        assert_eq!(protected.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&protected), LOGIN_ROUTE);

        let public = app.clone().oneshot(get("/votes", None)).await.unwrap();
        assert_eq!(public.status(), StatusCode::OK);

        let health = app.oneshot(get("/health", None)).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_signed_in_user_on_login_goes_home() {
        let app = router(gated(ScriptedAuth::new().with_user("a1", user("u1", "a@columbia.edu"))));
        let cookie = session_cookie("a1", "r1", in_an_hour());

        let response = app.oneshot(get("/login", Some(&cookie))).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), HOME_ROUTE);
        assert!(set_cookies(&response).is_empty());
    }

    #[tokio::test]
    async fn test_valid_session_passes_through() {
        let app = router(gated(ScriptedAuth::new().with_user("a1", user("u1", "a@columbia.edu"))));
        let cookie = session_cookie("a1", "r1", in_an_hour());

        let response = app.oneshot(get("/", Some(&cookie))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(&response).is_empty());
        assert_eq!(body_json(response).await["email"], "a@columbia.edu");
    }

    #[tokio::test]
    async fn test_refreshed_cookies_survive_pass_through() {
        let refreshed = session("a2", "r2", in_an_hour(), user("u1", "a@columbia.edu"));
        let app = router(gated(ScriptedAuth::new().with_refresh("r1", refreshed)));
        let cookie = session_cookie("a1", "r1", an_hour_ago());

        let response = app.oneshot(get("/captions", Some(&cookie))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.get("court-access-token").map(String::as_str), Some("a2"));
        assert_eq!(cookies.get("court-refresh-token").map(String::as_str), Some("r2"));
    }

    #[tokio::test]
    async fn test_refreshed_cookies_survive_redirect() {
        let refreshed = session("a2", "r2", in_an_hour(), user("u1", "a@columbia.edu"));
        let app = router(gated(ScriptedAuth::new().with_refresh("r1", refreshed)));
        let cookie = session_cookie("a1", "r1", an_hour_ago());

        let response = app.oneshot(get("/login", Some(&cookie))).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), HOME_ROUTE);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.get("court-access-token").map(String::as_str), Some("a2"));
        assert_eq!(cookies.get("court-refresh-token").map(String::as_str), Some("r2"));
    }

    #[tokio::test]
    async fn test_failed_refresh_redirects_and_clears() {
        let app = router(gated(ScriptedAuth::new()));
        let cookie = session_cookie("a1", "spent", an_hour_ago());

        let response = app.oneshot(get("/admin", Some(&cookie))).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), login_location("/admin"));
        let cookies = set_cookies(&response);
        assert_eq!(cookies.get("court-access-token").map(String::as_str), Some(""));
        assert_eq!(cookies.get("court-expires-at").map(String::as_str), Some(""));
    }

    #[tokio::test]
    async fn test_sign_out_after_refresh_clears_session() {
        let auth = Arc::new(ScriptedAuth::new().with_refresh(
            "r1",
            session("a2", "r2", in_an_hour(), user("u1", "a@columbia.edu")),
        ));
        let app = router(test_state(Some(Identity::new(auth.clone())), MemoryStore::new()));
        let cookie = session_cookie("a1", "r1", an_hour_ago());

        let response = app.oneshot(get("/auth/signout", Some(&cookie))).await.unwrap();

        assert_eq!(location(&response), LOGIN_ROUTE);
        assert_eq!(
            set_cookies(&response).get("court-access-token").map(String::as_str),
            Some("")
        );
        assert_eq!(auth.signed_out(), vec!["a2".to_string()]);
    }
}
