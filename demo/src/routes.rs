//! HTTP routes
//!
//! `/register` and `/login` are public; `/me` needs a bearer token. All three
//! share one [`GatewayLayer`], so every route is rate limited per client.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::http::header::{AUTHORIZATION, InvalidHeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chopper_gateway::{
    ClientKeyExtractor, Gateway, GatewayLayer, Identity, SigningError, bearer_header_value,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::users::{UserError, UserStore};

#[derive(Debug, Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub users: Arc<UserStore>,
}

/// Keys admission buckets by the TCP peer address
///
/// Needs the router served with `into_make_service_with_connect_info`.
/// Requests without connection info share the empty key.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerAddrKeyExtractor;

impl ClientKeyExtractor for PeerAddrKeyExtractor {
    fn client_key<B>(&self, req: &axum::http::Request<B>) -> String {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_default()
    }
}

pub fn router(state: AppState) -> Router {
    let gateway_layer =
        GatewayLayer::with_key_extractor(state.gateway.clone(), PeerAddrKeyExtractor)
            .public_path("/register")
            .public_path("/login");

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .layer(gateway_layer)
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error(transparent)]
    User(#[from] UserError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("issued token is not a valid header value")]
    Header(#[from] InvalidHeaderValue),

    #[error("background task failed")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, *message),
            Self::User(UserError::UsernameTaken) => {
                (StatusCode::CONFLICT, "username already taken")
            }
            Self::User(UserError::InvalidCredentials) => {
                (StatusCode::UNAUTHORIZED, "invalid credentials")
            }
            Self::User(UserError::Credential(_))
            | Self::Signing(_)
            | Self::Header(_)
            | Self::Join(_) => {
                error!(error = %self, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    id: Uuid,
    username: String,
    email: String,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.is_empty() || req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("username, email and password are required"));
    }

    let users = Arc::clone(&state.users);
    let user = tokio::task::spawn_blocking(move || {
        users.register(&req.username, &req.email, &req.password)
    })
    .await??;

    info!(user_id = %user.id, accounts = state.users.count(), "Account registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            username: user.username,
            email: user.email,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let users = Arc::clone(&state.users);
    let user =
        tokio::task::spawn_blocking(move || users.authenticate(&req.username, &req.password))
            .await??;

    let token = state
        .gateway
        .authority()
        .issue(&user.id.to_string(), &user.username, user.role)?;
    let header = bearer_header_value(&token)?;

    Ok(([(AUTHORIZATION, header)], Json(LoginResponse { token })))
}

async fn me(Extension(identity): Extension<Identity>) -> Json<Identity> {
    Json(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use chopper_gateway::{
        AdmissionController, BcryptHasher, BucketPolicy, TokenAuthority, UuidGenerator,
    };
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn app(burst: u32) -> Router {
        let authority = TokenAuthority::builder()
            .secret("0123456789abcdef0123456789abcdef")
            .issuer("chopper")
            .audience("chopper-web")
            .build()
            .unwrap();
        let admission = AdmissionController::new(BucketPolicy::per_second(1, burst).unwrap());
        router(AppState {
            gateway: Gateway::new(authority, Arc::new(admission)),
            users: Arc::new(UserStore::new(
                Arc::new(BcryptHasher::new(4)),
                Arc::new(UuidGenerator),
            )),
        })
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_login_me() {
        let app = app(10);
        let credentials = serde_json::json!({
            "username": "ursula",
            "email": "u@example.com",
            "password": "hunter22",
        });

        let response = app
            .clone()
            .oneshot(post_json("/register", credentials.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["username"], "ursula");
        assert_eq!(created["email"], "u@example.com");
        let user_id = created["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(post_json("/login", credentials))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let authorization = response.headers()[AUTHORIZATION].clone();
        let token = json_body(response).await["token"].as_str().unwrap().to_string();
        assert_eq!(authorization, format!("Bearer {token}").as_str());

        let response = app
            .oneshot(
                Request::get("/me")
                    .header(AUTHORIZATION, authorization)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let identity = json_body(response).await;
        assert_eq!(identity["subject"], user_id.as_str());
        assert_eq!(identity["display_name"], "ursula");
        assert_eq!(identity["role"], "standard");
    }

    #[tokio::test]
    async fn test_me_without_token() {
        let response = app(10)
            .oneshot(Request::get("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "no token");
    }

    #[tokio::test]
    async fn test_login_with_wrong_password() {
        let app = app(10);
        app.clone()
            .oneshot(post_json(
                "/register",
                serde_json::json!({"username": "u", "email": "e", "password": "right"}),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(post_json(
                "/login",
                serde_json::json!({"username": "u", "password": "wrong"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "invalid credentials");
    }

    #[tokio::test]
    async fn test_public_routes_are_rate_limited() {
        let app = app(1);
        let body = serde_json::json!({"username": "u", "password": "p"});

        let response = app
            .clone()
            .oneshot(post_json("/login", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(post_json("/login", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(response).await["error"], "too many requests");
    }
}
