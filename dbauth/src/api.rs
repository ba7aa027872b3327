//! HTTP surface over the authentication handlers.
//!
//! - `POST /authentication/login`: `{"username", "password"}` → claims object
//! - `POST /users/{username}/lock`: lock the account now, `204` on success
//! - `GET /healthz`: liveness
//!
//! The lock route is only mounted when `api.lock_token` is set, and callers
//! must present it as `Authorization: Bearer <token>`.

use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, State},
    http::{Extensions, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug};

use crate::auth::AuthenticationHandler;
use crate::config::ApiConfig;
use crate::errors::Error;
use crate::signing::constant_time_eq;
use crate::users::UserHandler;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<dyn AuthenticationHandler>,
    pub users: Arc<dyn UserHandler>,
    pub api: ApiConfig,
}

impl AppState {
    pub fn new(authenticator: Arc<dyn AuthenticationHandler>, users: Arc<dyn UserHandler>, api: ApiConfig) -> Self {
        Self {
            authenticator,
            users,
            api,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Derive the caller address: first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the TCP peer. Empty when none is known.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = header_value(headers, "x-forwarded-for")
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty());
        if let Some(address) = forwarded.or_else(|| header_value(headers, "x-real-ip")) {
            return address.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

fn peer_address(extensions: &Extensions) -> Option<SocketAddr> {
    extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| *addr)
}

#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(request): Json<LoginRequest>,
) -> Response {
    let address = client_address(&headers, peer_address(&extensions), state.api.trust_forwarded_headers);
    debug!(username = %request.username, %address, "login attempt");

    match state.authenticator.auth(&address, &request.username, &request.password).await {
        Ok(claims) => (StatusCode::OK, Json(claims)).into_response(),
        Err(e) => e.into_response_with(state.api.detailed_errors),
    }
}

/// Whether `headers` carry `Authorization: Bearer <token>` matching the configured lock token.
fn lock_authorized(headers: &HeaderMap, api: &ApiConfig) -> bool {
    let Some(expected) = api.lock_token() else {
        return false;
    };
    header_value(headers, "authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| constant_time_eq(token.trim().as_bytes(), expected.as_bytes()))
}

#[tracing::instrument(skip(state, headers))]
pub async fn lock_user(State(state): State<AppState>, headers: HeaderMap, Path(username): Path<String>) -> Response {
    if !lock_authorized(&headers, &state.api) {
        return Error::Unauthenticated.into_response_with(state.api.detailed_errors);
    }

    match state.users.lock_user(&username).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response_with(state.api.detailed_errors),
    }
}

pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/authentication/login", post(login));
    if state.api.lock_token().is_some() {
        router = router.route("/users/{username}/lock", post(lock_user));
    }

    router
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserAuthenticationHandler;
    use crate::config::{AuthConfig, UsersConfig};
    use crate::store::{MemoryStore, Row};
    use crate::users::DbUserHandler;
    use axum::http::HeaderValue;
    use axum_test::TestServer;
    use serde_json::Value;

    fn server(api: ApiConfig) -> (TestServer, Arc<MemoryStore>) {
        let store = Arc::new(
            MemoryStore::new("username").with_lock_column("locked_at").with_rows([
                Row::new().with("username", "alice").with("password", "wonderland").with("uid", 7i64),
                Row::new()
                    .with("username", "frank")
                    .with("password", "pw")
                    .with("allowed_ips", r#"["10.0.0.0/8"]"#),
                Row::new()
                    .with("username", "dave")
                    .with("password", "pw")
                    .with("locked_at", chrono::Utc::now() - chrono::Duration::days(1)),
            ]),
        );
        let users_config = UsersConfig {
            block_list: Some("allowed_ips".to_string()),
            locked_at: Some("locked_at".to_string()),
            lock_sql: Some("UPDATE users SET locked_at = ? WHERE username = ?".to_string()),
            ..UsersConfig::default()
        };
        let users: Arc<dyn UserHandler> = Arc::new(DbUserHandler::new(store.clone(), &users_config).unwrap());
        let authenticator = UserAuthenticationHandler::from_config(users.clone(), &AuthConfig::default()).unwrap();

        let state = AppState::new(Arc::new(authenticator), users, api);
        (TestServer::new(router(state)).unwrap(), store)
    }

    #[test]
    fn test_client_address_precedence() {
        let peer: SocketAddr = "192.0.2.1:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_address(&headers, Some(peer), true), "192.0.2.1");
        assert_eq!(client_address(&headers, None, true), "");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_address(&headers, Some(peer), true), "198.51.100.2");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"));
        assert_eq!(client_address(&headers, Some(peer), true), "203.0.113.9");

        // forwarded headers ignored when not trusted
        assert_eq!(client_address(&headers, Some(peer), false), "192.0.2.1");
    }

    #[tokio::test]
    async fn test_login_returns_claims() {
        let (server, _) = server(ApiConfig::default());

        let response = server
            .post("/authentication/login")
            .json(&json!({ "username": "alice", "password": "wonderland" }))
            .await;

        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["username"], "alice");
        assert_eq!(body["uid"], 7);
    }

    #[tokio::test]
    async fn test_login_denials_are_generic() {
        let (server, _) = server(ApiConfig::default());

        let response = server
            .post("/authentication/login")
            .json(&json!({ "username": "alice", "password": "nope" }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["message"], "Invalid username or password");

        let response = server
            .post("/authentication/login")
            .json(&json!({ "username": "", "password": "nope" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        // a locked account and a refused address look the same as a bad password
        let response = server
            .post("/authentication/login")
            .json(&json!({ "username": "dave", "password": "nope" }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["message"], "Invalid username or password");

        let response = server
            .post("/authentication/login")
            .add_header("x-forwarded-for", "192.168.1.1")
            .json(&json!({ "username": "frank", "password": "nope" }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["message"], "Invalid username or password");
    }

    #[tokio::test]
    async fn test_login_uses_forwarded_address() {
        let (server, _) = server(ApiConfig {
            detailed_errors: true,
            ..ApiConfig::default()
        });

        let response = server
            .post("/authentication/login")
            .add_header("x-forwarded-for", "10.1.2.3")
            .json(&json!({ "username": "frank", "password": "pw" }))
            .await;
        response.assert_status(StatusCode::OK);

        let response = server
            .post("/authentication/login")
            .add_header("x-forwarded-for", "192.168.1.1")
            .json(&json!({ "username": "frank", "password": "pw" }))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        let body: Value = response.json();
        assert_eq!(body["message"], "Client address 192.168.1.1 is not allowed for this account");
    }

    fn lock_api(detailed_errors: bool) -> ApiConfig {
        ApiConfig {
            detailed_errors,
            lock_token: Some("s3cret".to_string()),
            ..ApiConfig::default()
        }
    }

    #[tokio::test]
    async fn test_lock_route_absent_by_default() {
        let (server, store) = server(ApiConfig::default());

        let response = server.post("/users/alice/lock").add_header("authorization", "Bearer s3cret").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert!(store.statements().is_empty());

        let (blank, _) = self::server(ApiConfig {
            lock_token: Some(String::new()),
            ..ApiConfig::default()
        });
        blank.post("/users/alice/lock").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_lock_route_requires_token() {
        let (server, store) = server(lock_api(false));

        server.post("/users/alice/lock").await.assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/users/alice/lock")
            .add_header("authorization", "Bearer wrong")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/users/alice/lock")
            .add_header("authorization", "s3cret")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        assert!(store.rows()[0].get("locked_at").is_none());
    }

    #[tokio::test]
    async fn test_lock_route() {
        let (server, store) = server(lock_api(false));

        let response = server.post("/users/alice/lock").add_header("authorization", "Bearer s3cret").await;
        response.assert_status(StatusCode::NO_CONTENT);
        assert!(store.rows()[0].get("locked_at").is_some());

        let response = server.post("/users/ghost/lock").add_header("authorization", "Bearer s3cret").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["message"], "Account could not be locked");

        let (detailed, _) = self::server(lock_api(true));
        let response = detailed.post("/users/ghost/lock").add_header("authorization", "Bearer s3cret").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["message"], "No account named ghost");
    }

    #[tokio::test]
    async fn test_healthz() {
        let (server, _) = server(ApiConfig::default());
        let response = server.get("/healthz").await;
        response.assert_status(StatusCode::OK);
        assert_eq!(response.json::<Value>(), json!({ "status": "ok" }));
    }
}
