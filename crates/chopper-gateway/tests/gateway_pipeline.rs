//! Gateway middleware tests
//!
//! Drives [`GatewayLayer`] over a `service_fn` with `ServiceExt::oneshot`
//! and checks status codes, bodies, headers, and what reaches the inner service.

mod common;

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chopper_gateway::{
    Gateway, GatewayLayer, GatewayLayerConfig, Identity, Role, bearer_header_value,
};
use common::{clock, gateway};
use http::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{Request, Response, StatusCode};
use pretty_assertions::assert_eq;
use tower::{Layer, ServiceExt, service_fn};

async fn echo_identity(req: Request<()>) -> Result<Response<String>, Infallible> {
    let body = req
        .extensions()
        .get::<Identity>()
        .map(|identity| identity.subject.clone())
        .unwrap_or_else(|| "anonymous".to_string());
    Ok(Response::new(body))
}

fn request(path: &str, ip: &str, authorization: Option<&str>) -> Request<()> {
    let mut builder = Request::builder().uri(path).header("x-forwarded-for", ip);
    if let Some(value) = authorization {
        builder = builder.header(AUTHORIZATION, value);
    }
    builder.body(()).unwrap()
}

async fn send(gateway: &Gateway, req: Request<()>) -> Response<String> {
    GatewayLayer::new(gateway.clone())
        .public_path("/register")
        .public_path("/login")
        .layer(service_fn(echo_identity))
        .oneshot(req)
        .await
        .unwrap()
}

fn bearer(gateway: &Gateway, subject: &str) -> String {
    let token = gateway
        .authority()
        .issue(subject, "Ursula", Role::Standard)
        .unwrap();
    bearer_header_value(&token)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_public_route_without_token() {
    let gateway = gateway(1, 5, &clock());

    let response = send(&gateway, request("/login", "10.0.0.1", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), "anonymous");
}

#[tokio::test]
async fn test_protected_route_with_valid_token() {
    let gateway = gateway(1, 5, &clock());
    let auth = bearer(&gateway, "u1");

    let response = send(&gateway, request("/me", "10.0.0.1", Some(&auth))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), "u1");
}

#[tokio::test]
async fn test_identity_rejections() {
    let gateway = gateway(10, 10, &clock());
    let cases = [
        (None, "no token"),
        (Some("Token abc"), "invalid authorization field"),
        (Some("bearer abc"), "invalid authorization field"),
        (Some("Bearer "), "invalid authorization field"),
        (Some("Bearer not.a.token"), "invalid token"),
    ];

    for (authorization, message) in cases {
        let response = send(&gateway, request("/me", "10.0.0.1", authorization)).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{authorization:?}");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");

        let body: serde_json::Value = serde_json::from_str(response.body()).unwrap();
        assert_eq!(body["error"], message);
    }
}

#[tokio::test]
async fn test_expired_token_is_invalid() {
    let clock = clock();
    let gateway = gateway(10, 10, &clock);
    let auth = bearer(&gateway, "u1");

    clock.advance(Duration::from_secs(3600));
    let response = send(&gateway, request("/me", "10.0.0.1", Some(&auth))).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.body(), r#"{"error":"invalid token"}"#);
}

#[tokio::test]
async fn test_rate_limit_applies_before_identity() {
    let gateway = gateway(1, 2, &clock());
    let auth = bearer(&gateway, "u1");

    for _ in 0..2 {
        let response = send(&gateway, request("/me", "10.0.0.1", Some(&auth))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    // A valid token does not help once the bucket is empty
    let response = send(&gateway, request("/me", "10.0.0.1", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.body(), r#"{"error":"too many requests"}"#);
    assert!(response.headers().get(WWW_AUTHENTICATE).is_none());

    // Public routes are limited too
    let response = send(&gateway, request("/login", "10.0.0.1", None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Another client is unaffected
    let response = send(&gateway, request("/me", "10.0.0.2", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_recovers_after_refill() {
    let clock = clock();
    let gateway = gateway(1, 1, &clock);

    let response = send(&gateway, request("/login", "10.0.0.1", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send(&gateway, request("/login", "10.0.0.1", None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    clock.advance(Duration::from_secs(1));
    let response = send(&gateway, request("/login", "10.0.0.1", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rejected_requests_never_reach_inner_service() {
    let gateway = gateway(1, 1, &clock());
    let calls = Arc::new(AtomicUsize::new(0));

    let counting = {
        let calls = Arc::clone(&calls);
        service_fn(move |req: Request<()>| {
            calls.fetch_add(1, Ordering::SeqCst);
            echo_identity(req)
        })
    };
    let service = GatewayLayer::new(gateway.clone()).layer(counting);

    // Missing token: rejected at the identity gate
    let response = service
        .clone()
        .oneshot(request("/me", "10.0.0.1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Bucket now empty: rejected at the admission gate
    let auth = bearer(&gateway, "u1");
    let response = service
        .oneshot(request("/me", "10.0.0.1", Some(&auth)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_all_public_layer_still_limits() {
    let gateway = gateway(1, 1, &clock());
    let service = GatewayLayer::new(gateway)
        .config(GatewayLayerConfig::all_public())
        .layer(service_fn(echo_identity));

    let response = service
        .clone()
        .oneshot(request("/anything", "10.0.0.1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = service
        .oneshot(request("/anything", "10.0.0.1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
