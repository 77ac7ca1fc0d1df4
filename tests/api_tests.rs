//! End-to-end HTTP tests over the full router with a scripted provider.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use gitportal::config::AppConfig;
use gitportal::connectors::{ApiRegistry, FetchError, Page};
use gitportal::normalization::ProviderKind;
use gitportal::server::{AppState, create_app};
use serde_json::{Value, json};
use tower::ServiceExt;

mod test_utils;
use test_utils::{MockProviderApi, issue, pull_request, setup_test_db, workflow_run};

async fn app() -> Result<(Router, Arc<MockProviderApi>)> {
    let db = setup_test_db().await?;
    let api = MockProviderApi::new(ProviderKind::Github);
    let mut registry = ApiRegistry::new();
    registry.register(api.clone());

    let config = AppConfig {
        crypto_key: Some(vec![3u8; 32]),
        operator_login: Some("octocat".to_string()),
        ..AppConfig::default()
    };
    let state = AppState::new(Arc::new(config), db, Arc::new(registry))?;
    Ok((create_app(state), api))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn put(uri: &str, body: Value) -> Request<Body> {
    Request::put(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::delete(uri).body(Body::empty()).unwrap()
}

async fn create_github(app: &Router, token: Option<&str>) -> i64 {
    let (status, body) = send(
        app,
        post(
            "/providers",
            json!({
                "name": "Work GitHub",
                "kind": "github",
                "base_url": "https://github.com",
                "api_base_url": "https://api.github.com",
                "token": token
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().unwrap()
}

async fn add_repository(app: &Router, provider_id: i64, full_name: &str) -> i64 {
    let (status, body) = send(
        app,
        post(
            "/repositories",
            json!({
                "provider_id": provider_id,
                "web_url": format!("https://github.com/{full_name}")
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn provider_responses_never_carry_the_token() -> Result<()> {
    let (app, _api) = app().await?;
    let id = create_github(&app, Some("ghp_secret")).await;

    let (status, body) = send(&app, get(&format!("/providers/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_token"], true);
    assert_eq!(body["token_valid"], false);
    assert!(!body.to_string().contains("ghp_secret"));

    let (_, list) = send(&app, get("/providers")).await;
    assert_eq!(list.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn duplicate_provider_name_is_a_conflict() -> Result<()> {
    let (app, _api) = app().await?;
    create_github(&app, None).await;

    let (status, body) = send(
        &app,
        post(
            "/providers",
            json!({
                "name": "work github",
                "kind": "github",
                "base_url": "https://github.com",
                "api_base_url": "https://api.github.com"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
    Ok(())
}

#[tokio::test]
async fn token_update_and_validation() -> Result<()> {
    let (app, api) = app().await?;
    let id = create_github(&app, None).await;

    let (status, body) = send(&app, post(&format!("/providers/{id}/validate"), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_valid"], false);

    let (status, body) = send(
        &app,
        put(&format!("/providers/{id}/token"), json!({"token": "t2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_token"], true);

    let (status, body) = send(&app, post(&format!("/providers/{id}/validate"), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_valid"], true);
    assert!(api.calls().contains(&"validate:t2".to_string()));

    let (_, body) = send(
        &app,
        put(&format!("/providers/{id}/token"), json!({"token": null})),
    )
    .await;
    assert_eq!(body["has_token"], false);
    assert_eq!(body["token_valid"], false);
    Ok(())
}

#[tokio::test]
async fn repository_outside_provider_host_is_rejected() -> Result<()> {
    let (app, _api) = app().await?;
    let id = create_github(&app, Some("t1")).await;

    let (status, body) = send(
        &app,
        post(
            "/repositories",
            json!({"provider_id": id, "web_url": "https://gitlab.com/acme/app"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    Ok(())
}

#[tokio::test]
async fn sync_then_query_round_trip() -> Result<()> {
    let (app, api) = app().await?;
    let provider_id = create_github(&app, Some("t1")).await;
    let repository_id = add_repository(&app, provider_id, "acme/app").await;

    api.script_issues(
        "acme/app",
        vec![Ok(Page::last(vec![
            issue("i-1", 1, "open", &["octocat"]),
            issue("i-2", 2, "open", &[]),
            issue("i-3", 3, "closed", &["octocat"]),
        ]))],
    );
    api.script_pull_requests(
        "acme/app",
        vec![Ok(Page::last(vec![pull_request("p-1", 4, "closed", true)]))],
    );
    api.script_workflow_runs(
        "acme/app",
        vec![Ok(Page::last(vec![workflow_run(
            "w-1",
            "completed",
            Some("failure"),
            "octocat",
        )]))],
    );

    let (status, entry) = send(
        &app,
        post(&format!("/sync/providers/{provider_id}"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{entry}");
    assert_eq!(entry["status"], "completed");
    assert_eq!(entry["scope"], "provider");
    assert_eq!(entry["items_synced"], 5);
    assert_eq!(entry["errors_count"], 0);

    let (status, page) = send(&app, get("/issues?state=open&assigned_to_me=true")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total"], 1);
    assert_eq!(page["data"][0]["assigned_to_me"], true);
    assert_eq!(page["data"][0]["repository_name"], "acme/app");

    let (_, page) = send(&app, get("/issues?per_page=2&page=2")).await;
    assert_eq!(page["pagination"]["total"], 3);
    assert_eq!(page["pagination"]["total_pages"], 2);
    assert_eq!(page["data"].as_array().map(Vec::len), Some(1));

    let (_, stats) = send(&app, get("/pull-requests/stats")).await;
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["by_state"]["merged"], 1);

    let (_, runs) = send(&app, get("/workflows?state=failure")).await;
    assert_eq!(runs["pagination"]["total"], 1);
    let run_id = runs["data"][0]["id"].as_i64().unwrap();
    let (status, run) = send(&app, get(&format!("/workflows/{run_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["native_status"], "completed");

    let (_, repo) = send(&app, get(&format!("/repositories/{repository_id}"))).await;
    assert!(repo["issues"]["last_synced_at"].is_string());
    assert!(repo["workflows"]["error"].is_null());

    let (_, history) = send(&app, get("/sync/history?limit=5")).await;
    assert_eq!(history.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn partial_failures_are_reported_in_the_history_entry() -> Result<()> {
    let (app, api) = app().await?;
    let provider_id = create_github(&app, Some("t1")).await;
    let repository_id = add_repository(&app, provider_id, "acme/app").await;
    api.script_pull_requests(
        "acme/app",
        vec![Err(FetchError::rate_limited(Some(30), "secondary rate limit"))],
    );

    let (status, entry) = send(
        &app,
        post(&format!("/sync/repositories/{repository_id}"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["status"], "completed");
    assert_eq!(entry["errors_count"], 1);

    let (_, repo) = send(&app, get(&format!("/repositories/{repository_id}"))).await;
    let error = repo["pull_requests"]["error"].as_str().unwrap_or_default();
    assert!(error.starts_with("rate_limited:"), "{error}");
    Ok(())
}

#[tokio::test]
async fn invalid_filters_and_missing_items() -> Result<()> {
    let (app, _api) = app().await?;

    let (status, body) = send(&app, get("/pull-requests?state=draft")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, body) = send(&app, get("/issues?page=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, body) = send(&app, get("/issues/404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = send(&app, post("/sync/repositories/404", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn sync_status_and_lock_release() -> Result<()> {
    let (app, _api) = app().await?;

    let (status, body) = send(&app, get("/sync/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["in_progress"], false);

    let (status, body) = send(&app, post("/sync/lock/release", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], false);

    let (status, body) = send(&app, post("/sync/all", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scope"], "all_providers");
    assert_eq!(body["status"], "completed");
    Ok(())
}

#[tokio::test]
async fn settings_can_be_read_and_updated() -> Result<()> {
    let (app, _api) = app().await?;

    let (status, body) = send(&app, get("/settings")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sync_interval_minutes"], 30);
    assert_eq!(body["auto_sync_enabled"], true);

    let (status, body) = send(
        &app,
        put(
            "/settings",
            json!({"sync_interval_minutes": 5, "auto_sync_enabled": false}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sync_interval_minutes"], 5);

    let (status, _) = send(
        &app,
        put(
            "/settings",
            json!({"sync_interval_minutes": 0, "auto_sync_enabled": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        put(
            "/settings",
            json!({"sync_interval_minutes": 1_000_000_000_000_000u64, "auto_sync_enabled": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, get("/settings")).await;
    assert_eq!(body["auto_sync_enabled"], false);
    assert_eq!(body["sync_interval_minutes"], 5);
    Ok(())
}

#[tokio::test]
async fn deleting_a_provider_removes_its_repositories() -> Result<()> {
    let (app, _api) = app().await?;
    let provider_id = create_github(&app, Some("t1")).await;
    let repository_id = add_repository(&app, provider_id, "acme/app").await;

    let (status, _) = send(&app, delete(&format!("/providers/{provider_id}"))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get(&format!("/providers/{provider_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, get(&format!("/repositories/{repository_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
