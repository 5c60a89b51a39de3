mod support;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use drinks_service::repo::{seed_if_empty, DrinkRepository};
use drinks_service::Compatibility;
use serde_json::json;
use support::{app, claims, envelope, foreign_signature, manager_token, send, send_request, sign, sign_with, token, ALL_PERMISSIONS};

const ROUTES: [(&str, &str, &str); 5] = [
    ("GET", "/drinks", "get:drinks"),
    ("GET", "/drinks-detail", "get:drinks-detail"),
    ("POST", "/drinks", "post:drinks"),
    ("PATCH", "/drinks/1", "patch:drinks"),
    ("DELETE", "/drinks/1", "delete:drinks"),
];

fn body_for(method: &Method) -> Option<serde_json::Value> {
    (*method == Method::POST || *method == Method::PATCH).then(|| json!({"title": "Cortado"}))
}

#[tokio::test]
async fn every_route_is_guarded_by_its_own_permission() {
    for (method, uri, required) in ROUTES {
        let (app, repo) = app(Compatibility::Corrected);
        seed_if_empty(repo.as_ref()).await.unwrap();
        let method: Method = method.parse().unwrap();
        let others: Vec<&str> = ALL_PERMISSIONS.iter().copied().filter(|p| *p != required).collect();

        let denied = send(&app, method.clone(), uri, Some(&token(&others)), body_for(&method)).await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN, "{method} {uri}");
        assert_eq!(denied.body, envelope(403, "Permission not found."));

        let allowed = send(&app, method.clone(), uri, Some(&token(&[required])), body_for(&method)).await;
        assert_eq!(allowed.status, StatusCode::OK, "{method} {uri}: {}", allowed.body);
    }
}

#[tokio::test]
async fn forbidden_write_leaves_store_untouched() {
    let (app, repo) = app(Compatibility::Corrected);
    let reply = send(&app, Method::POST, "/drinks", Some(&token(&["get:drinks"])), Some(json!({"title": "Sneaky"}))).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert!(repo.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_authorization_headers_are_401() {
    let (app, _) = app(Compatibility::Corrected);

    let missing = send(&app, Method::GET, "/drinks", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.body, envelope(401, "Authorization header is expected."));
    assert_eq!(missing.headers["x-error-code"], "missing_token");

    for value in ["Basic abc", "Bearer", "Bearer a b", "Bearer  abc", "Bearer\tabc"] {
        let request = Request::builder()
            .uri("/drinks")
            .header("authorization", value)
            .body(Body::empty())
            .unwrap();
        let reply = send_request(&app, request).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "{value}");
        assert_eq!(reply.body, envelope(401, "Authorization header must be bearer token."));
    }
}

#[tokio::test]
async fn token_failures_are_classified() {
    let (app, _) = app(Compatibility::Corrected);

    let mut expired = claims(&["get:drinks"]);
    expired["exp"] = json!(chrono::Utc::now().timestamp() - 3600);
    let reply = send(&app, Method::GET, "/drinks", Some(&sign(&expired)), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body, envelope(401, "Token expired."));
    assert_eq!(reply.headers["x-error-code"], "expired_token");

    let mut wrong_audience = claims(&["get:drinks"]);
    wrong_audience["aud"] = json!("someone-else");
    let reply = send(&app, Method::GET, "/drinks", Some(&sign(&wrong_audience)), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body, envelope(401, "Incorrect claims. Please, check the audience and issuer."));

    let unknown_kid = sign_with(&claims(&["get:drinks"]), Some("rotated-away"), include_str!("fixtures/jwt-test.pem"));
    let reply = send(&app, Method::GET, "/drinks", Some(&unknown_kid), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.headers["x-error-code"], "unknown_key");

    let no_kid = sign_with(&claims(&["get:drinks"]), None, include_str!("fixtures/jwt-test.pem"));
    let reply = send(&app, Method::GET, "/drinks", Some(&no_kid), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.headers["x-error-code"], "unknown_key");

    let forged = foreign_signature(&claims(&["get:drinks"]));
    let reply = send(&app, Method::GET, "/drinks", Some(&forged), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.headers["x-error-code"], "invalid_token");

    let reply = send(&app, Method::GET, "/drinks", Some("not.a.jwt"), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let mut no_permissions = claims(&[]);
    no_permissions.as_object_mut().unwrap().remove("permissions");
    let reply = send(&app, Method::GET, "/drinks", Some(&sign(&no_permissions)), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body, envelope(401, "Permissions not included in JWT."));
    assert_eq!(reply.headers["x-error-code"], "invalid_claims");
}

#[tokio::test]
async fn auth_runs_before_body_parsing() {
    let (app, _) = app(Compatibility::Corrected);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/drinks")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let reply = send_request(&app, request).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unreadable_bodies_use_the_envelope() {
    let (app, _) = app(Compatibility::Corrected);
    let tok = manager_token();

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/drinks")
        .header("authorization", format!("Bearer {tok}"))
        .header("content-type", "application/json")
        .body(Body::from("{\"title\": "))
        .unwrap();
    let reply = send_request(&app, malformed).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body, envelope(400, "Bad Request"));
    assert_eq!(reply.headers["x-error-code"], "malformed_json");

    let no_content_type = Request::builder()
        .method(Method::POST)
        .uri("/drinks")
        .header("authorization", format!("Bearer {tok}"))
        .body(Body::from("{\"title\": \"Latte\"}"))
        .unwrap();
    let reply = send_request(&app, no_content_type).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let wrong_shape = send(&app, Method::POST, "/drinks", Some(&tok), Some(json!({"title": 5}))).await;
    assert_eq!(wrong_shape.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(wrong_shape.body["success"], false);
    assert_eq!(wrong_shape.body["error"], 422);
    assert_eq!(wrong_shape.headers["x-error-code"], "invalid_body");

    let bad_recipe = json!({"title": "Latte", "recipe": [{"name": "milk", "color": "white", "parts": -1}]});
    let reply = send(&app, Method::POST, "/drinks", Some(&tok), Some(bad_recipe)).await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn framework_errors_use_the_envelope() {
    let (app, _) = app(Compatibility::Corrected);
    let tok = manager_token();

    let wrong_method = send(&app, Method::PUT, "/drinks", Some(&tok), None).await;
    assert_eq!(wrong_method.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(wrong_method.body, envelope(405, "Method(s) not allowed"));
    assert!(wrong_method.headers.contains_key("allow"));

    let unknown = send(&app, Method::GET, "/cocktails", Some(&tok), None).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown.body, envelope(404, "Resource(s) not found"));
}

#[tokio::test]
async fn operational_routes_need_no_token() {
    let (app, _) = app(Compatibility::Corrected);

    let health = send(&app, Method::GET, "/healthz", None, None).await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body, json!("ok"));

    send(&app, Method::GET, "/drinks", None, None).await;
    let metrics = send(&app, Method::GET, "/metrics", None, None).await;
    assert_eq!(metrics.status, StatusCode::OK);
    let text = metrics.body.as_str().unwrap();
    assert!(text.contains("http_errors_total"));
    assert!(text.contains("code=\"missing_token\""));
}

#[tokio::test]
async fn cors_preflight_allows_authorization_header() {
    let (app, _) = app(Compatibility::Corrected);
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/drinks")
        .header("origin", "http://localhost:8100")
        .header("access-control-request-method", "PATCH")
        .header("access-control-request-headers", "authorization,content-type")
        .body(Body::empty())
        .unwrap();
    let reply = send_request(&app, request).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["access-control-allow-origin"], "*");
}
