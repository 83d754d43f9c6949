//! Host router flows against a fake PocketBase

use axum::body::Body;
use axum::extract::Request;
use axum::http::{Method, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use tower::ServiceExt;

use clairvoyance_core::InitState;
use clairvoyance_e2e_tests::harness::TestHost;
use clairvoyance_e2e_tests::mocks::{FakePocketBase, OntologyFactory};
use clairvoyance_server::bootstrap::SETTINGS_COLLECTION;

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_ontology_requests_leave_backend_alone() {
    let backend = FakePocketBase::spawn().await;
    let host = TestHost::new(&backend.base_url());

    let response = host
        .router
        .clone()
        .oneshot(post_json(
            "/api/ontology",
            &OntologyFactory::ui_payload(&OntologyFactory::animals()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "success": true }));
    assert_eq!(host.state.bootstrap.state(), InitState::Uninitialized);
    assert!(backend.state().requests.is_empty());
}

#[tokio::test]
async fn test_first_proxied_request_bootstraps_backend() {
    let backend = FakePocketBase::spawn().await;
    let host = TestHost::new(&backend.base_url());
    assert_eq!(host.state.bootstrap.state(), InitState::Uninitialized);

    let response = host
        .router
        .clone()
        .oneshot(get("/pb/api/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(host.state.bootstrap.state(), InitState::Initialized);

    let fake = backend.state();
    assert_eq!(
        fake.admin_email.as_deref(),
        Some(clairvoyance_server::config::DEFAULT_ADMIN_EMAIL)
    );
    assert_eq!(fake.collections[SETTINGS_COLLECTION].len(), 1);
    assert_eq!(
        fake.collections[SETTINGS_COLLECTION][0]["instance_name"],
        "Clairvoyance"
    );
}

#[tokio::test]
async fn test_bootstrap_runs_once_under_concurrent_requests() {
    let backend = FakePocketBase::spawn().await;
    let host = TestHost::new(&backend.base_url());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let router = host.router.clone();
        tasks.push(tokio::spawn(async move {
            router.oneshot(get("/pb/api/health")).await.unwrap().status()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    let fake = backend.state();
    assert_eq!(fake.count("POST /api/admins"), 1);
    assert_eq!(fake.count("POST /api/admins/auth-with-password"), 1);
    assert_eq!(fake.count("POST /api/collections"), 1);
}

#[tokio::test]
async fn test_proxy_forwards_path_and_query() {
    let backend = FakePocketBase::spawn().await;
    let host = TestHost::new(&backend.base_url());

    let response = host
        .router
        .clone()
        .oneshot(get(
            "/pb/api/collections/instance_settings/records?page=1&perPage=1&sort=-created",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["totalItems"], 1);

    let fake = backend.state();
    assert_eq!(
        fake.requests.last().map(String::as_str),
        Some("GET /api/collections/instance_settings/records?page=1&perPage=1&sort=-created")
    );
}

#[tokio::test]
async fn test_proxy_relays_backend_404() {
    let backend = FakePocketBase::spawn().await;
    let host = TestHost::new(&backend.base_url());

    let response = host
        .router
        .clone()
        .oneshot(get("/pb/api/collections/missing/records"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], 404);
}

#[tokio::test]
async fn test_proxy_over_tcp_with_real_client() {
    let backend = FakePocketBase::spawn().await;
    let host = TestHost::new(&backend.base_url());
    let url = host.serve().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!(
            "{}/pb/api/collections/{}/records",
            url, SETTINGS_COLLECTION
        ))
        .json(&json!({ "instance_name": "Second", "instance_url": "", "theme": {} }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["instance_name"], "Second");
    assert_eq!(created["id"], "rec1");

    let health: Value = client
        .get(format!("{}/api/health", url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["bootstrap"], "initialized");
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn test_unavailable_backend_degrades_only_the_proxy() {
    let host = TestHost::new(&closed_port_url().await);

    let response = host
        .router
        .clone()
        .oneshot(get("/pb/api/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        json_body(response).await["error"],
        "Embedded backend unavailable"
    );
    assert_eq!(host.state.bootstrap.state(), InitState::InitFailed);

    let response = host
        .router
        .clone()
        .oneshot(post_json(
            "/api/ontology",
            &OntologyFactory::bare_payload(&OntologyFactory::animals()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = host.router.clone().oneshot(get("/api/health")).await.unwrap();
    let health = json_body(response).await;
    assert_eq!(health["bootstrap"], "init_failed");
    assert_eq!(health["ontology"]["rules"], 1);
}
