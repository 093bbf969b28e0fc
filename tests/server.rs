use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use cashpot::server::{router, AppState, AuthConfig};
use cashpot::store::{DocumentStore, FileStore};
use cashpot::Store;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn auth(require_auth: bool) -> AuthConfig {
    AuthConfig {
        secret: "server-test-secret".into(),
        issuer: "cashpot".into(),
        ttl_secs: 600,
        require_auth,
    }
}

fn app_with(store: Arc<dyn Store>, require_auth: bool) -> Router {
    router(AppState::new(store, auth(require_auth)))
}

fn app() -> Router {
    app_with(Arc::new(DocumentStore::in_memory()), false)
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn raw_post(app: &Router, uri: &str, body: &'static str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = call(&app(), Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("OK"));
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn crud_under_the_flat_prefix() {
    let app = app();
    let (status, created) = call(
        &app,
        Method::POST,
        "/api/companies",
        Some(json!({ "name": "Acme", "id": "forged", "created_date": "1999-01-01T00:00:00Z" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("companies-"));
    assert_ne!(created["created_date"], json!("1999-01-01T00:00:00Z"));

    let (status, fetched) = call(&app, Method::GET, &format!("/api/companies/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, updated) = call(
        &app,
        Method::PUT,
        &format!("/api/companies/{id}"),
        Some(json!({ "email": "hq@acme.test" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], json!("Acme"));
    assert_eq!(updated["email"], json!("hq@acme.test"));
    assert_eq!(updated["created_date"], created["created_date"]);

    let (status, list) = call(&app, Method::GET, "/api/companies", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, body) = call(&app, Method::DELETE, &format!("/api/companies/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (status, body) = call(&app, Method::GET, &format!("/api/companies/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn both_prefixes_share_the_store() {
    let app = app();
    let (_, created) = call(
        &app,
        Method::POST,
        "/api/data/jackpots",
        Some(json!({ "current_amount": 1250.5 })),
        None,
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, fetched) = call(&app, Method::GET, &format!("/api/jackpots/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["current_amount"], json!(1250.5));

    let (status, dataset) = call(&app, Method::GET, "/api/data", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dataset["jackpots"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn list_sorts_by_query() {
    let app = app();
    for level in [2, 3, 1] {
        call(&app, Method::POST, "/api/jackpots", Some(json!({ "level": level })), None).await;
    }
    let (_, list) = call(&app, Method::GET, "/api/jackpots?sort=-level", None, None).await;
    let levels: Vec<&Value> = list.as_array().unwrap().iter().map(|r| &r["level"]).collect();
    assert_eq!(levels, vec![&json!(3), &json!(2), &json!(1)]);
}

#[tokio::test]
async fn errors_are_json() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Route not found" }));

    let (status, body) = call(&app, Method::GET, "/api/widgets", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("Unknown entity: widgets"));

    let (status, body) = raw_post(&app, "/api/companies", "{ not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("malformed"));

    let (status, _) = raw_post(&app, "/api/companies", "[1, 2]").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::POST, "/api/companies", Some(json!({ "email": "x" })), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/companies/companies-missing",
        Some(json!({ "name": "X" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_delete_is_all_or_nothing() {
    let store: Arc<dyn Store> = Arc::new(DocumentStore::in_memory());
    let app = app_with(Arc::clone(&store), false);
    let a = store.create("invoices", Default::default()).unwrap();
    let b = store.create("invoices", Default::default()).unwrap();

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/invoices/bulk-delete",
        Some(json!({ "ids": [a.id, "invoices-ghost"] })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(store.list("invoices").unwrap().len(), 2);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/data/invoices/bulk-delete",
        Some(json!({ "ids": [a.id, b.id] })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "deleted": 2 }));
    assert!(store.list("invoices").unwrap().is_empty());

    let (status, _) = raw_post(&app, "/api/invoices/bulk-delete", "{\"ids\": \"all\"}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn file_store_backend_serves_free_entity_names() {
    let path = std::env::temp_dir().join("cashpot_server_file_store.json");
    let _ = std::fs::remove_file(&path);
    let store: Arc<dyn Store> = Arc::new(FileStore::open(&path).unwrap());
    let app = app_with(store, false);

    let (status, _) = call(&app, Method::POST, "/api/notes", Some(json!({ "text": "hi" })), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, list) = call(&app, Method::GET, "/api/notes", None, None).await;
    assert_eq!(list[0]["text"], json!("hi"));
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn register_login_and_me() {
    let app = app();
    let (status, session) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        Some(json!({ "username": "ana", "email": "ana@cashpot.test", "password": "s3cret" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["user"]["username"], json!("ana"));
    assert_eq!(session["user"]["role"], json!("user"));
    assert!(session["user"].get("password_hash").is_none());
    assert!(session["user"].get("password").is_none());

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        Some(json!({ "username": "other", "email": "ana@cashpot.test", "password": "x" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("User already exists"));

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        Some(json!({ "username": "bob", "email": "bob@cashpot.test" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth/login",
        Some(json!({ "username": "ana", "password": "nope" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("Invalid credentials"));

    let (status, login) = call(
        &app,
        Method::POST,
        "/api/auth/login",
        Some(json!({ "email": "ana@cashpot.test", "password": "s3cret" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = login["token"].as_str().unwrap();

    let (status, me) = call(&app, Method::GET, "/api/auth/me", None, Some(token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], session["user"]["id"]);

    let (status, _) = call(&app, Method::GET, "/api/auth/me", None, Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn user_records_never_expose_hashes() {
    let store: Arc<dyn Store> = Arc::new(DocumentStore::in_memory());
    let app = app_with(Arc::clone(&store), false);
    let (status, created) = call(
        &app,
        Method::POST,
        "/api/users",
        Some(json!({
            "username": "op",
            "email": "op@cashpot.test",
            "password": "pw",
            "password_hash": "forged",
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created.get("password_hash").is_none());

    let id = created["id"].as_str().unwrap();
    let stored = store.get("users", id).unwrap().unwrap();
    let hash = stored.str_field("password_hash").unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(stored.field("password").is_none());

    let (_, list) = call(&app, Method::GET, "/api/users", None, None).await;
    assert!(list[0].get("password_hash").is_none());
    let (_, dataset) = call(&app, Method::GET, "/api/data", None, None).await;
    assert!(dataset["users"][0].get("password_hash").is_none());
}

#[tokio::test]
async fn entity_routes_require_a_token_when_configured() {
    let app = app_with(Arc::new(DocumentStore::in_memory()), true);

    let (status, _) = call(&app, Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::GET, "/api/companies", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("Missing bearer token"));
    let (status, _) = call(&app, Method::GET, "/api/data", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, session) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        Some(json!({ "username": "ana", "email": "ana@cashpot.test", "password": "s3cret" })),
        None,
    )
    .await;
    let token = session["token"].as_str().unwrap();

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/companies",
        Some(json!({ "name": "Acme" })),
        Some(token),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(&app, Method::GET, "/api/data", None, Some(token)).await;
    assert_eq!(status, StatusCode::OK);
}
