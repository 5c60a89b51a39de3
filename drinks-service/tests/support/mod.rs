#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use common_auth::{JwtConfig, JwtVerifier};
use drinks_service::app::cors_layer;
use drinks_service::repo::{DrinkRepository, InMemoryDrinkRepository};
use drinks_service::{build_router, AppState, Compatibility};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const ISSUER: &str = "https://coffee-shop.test/";
pub const AUDIENCE: &str = "drinks";
pub const KID: &str = "drinks-test";

const PRIVATE_PEM: &str = include_str!("../fixtures/jwt-test.pem");
const PUBLIC_PEM: &str = include_str!("../fixtures/jwt-test.pub.pem");
const OTHER_PRIVATE_PEM: &str = include_str!("../fixtures/jwt-other.pem");

pub const ALL_PERMISSIONS: [&str; 5] = [
    "get:drinks",
    "get:drinks-detail",
    "post:drinks",
    "patch:drinks",
    "delete:drinks",
];

pub fn verifier() -> Arc<JwtVerifier> {
    let verifier = JwtVerifier::new(JwtConfig::new(ISSUER, AUDIENCE))
        .with_local_key(KID, PUBLIC_PEM.as_bytes())
        .expect("public pem");
    Arc::new(verifier)
}

/// Claims for a barista token; callers tweak them before signing.
pub fn claims(permissions: &[&str]) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "sub": "auth0|barista",
        "iss": ISSUER,
        "aud": AUDIENCE,
        "iat": now,
        "exp": now + 600,
        "permissions": permissions,
    })
}

pub fn sign(claims: &Value) -> String {
    sign_with(claims, Some(KID), PRIVATE_PEM)
}

pub fn sign_with(claims: &Value, kid: Option<&str>, private_pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap()).unwrap()
}

pub fn foreign_signature(claims: &Value) -> String {
    sign_with(claims, Some(KID), OTHER_PRIVATE_PEM)
}

pub fn token(permissions: &[&str]) -> String {
    sign(&claims(permissions))
}

pub fn manager_token() -> String {
    token(&ALL_PERMISSIONS)
}

pub fn app_with(repo: Arc<dyn DrinkRepository>, compat: Compatibility) -> Router {
    let state = AppState::new(repo, verifier(), compat);
    build_router(state, cors_layer(&["*".to_string()]))
}

pub fn app(compat: Compatibility) -> (Router, Arc<InMemoryDrinkRepository>) {
    let repo = Arc::new(InMemoryDrinkRepository::new());
    (app_with(repo.clone(), compat), repo)
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send_request(app: &Router, request: Request<Body>) -> Reply {
    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    Reply { status, headers, body }
}

pub async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    send_request(app, request).await
}

pub fn envelope(status: u16, message: &str) -> Value {
    json!({"success": false, "error": status, "message": message})
}
