use std::time::Duration;

use gitportal::connectors::http::build_client;
use gitportal::connectors::{
    FetchErrorKind, GitLabClient, PageRequest, ProviderApi, ProviderEndpoint, RepositoryRef,
};
use gitportal::crypto::SecretToken;
use gitportal::normalization::ProviderKind;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

fn client() -> GitLabClient {
    GitLabClient::new(build_client(Duration::from_secs(5)).unwrap())
}

fn endpoint(server: &MockServer) -> ProviderEndpoint {
    ProviderEndpoint {
        kind: ProviderKind::Gitlab,
        api_base_url: format!("{}/api/v4", server.uri()),
        token: SecretToken::new("glpat-test"),
    }
}

fn project() -> RepositoryRef {
    RepositoryRef {
        api_id: "77".to_string(),
        full_name: "group/sub/app".to_string(),
    }
}

fn page(n: u32) -> PageRequest {
    PageRequest {
        page: n,
        per_page: 20,
        since: None,
    }
}

#[tokio::test]
async fn token_probe_uses_private_token_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/user"))
        .and(header("private-token", "glpat-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"username": "tanuki"})))
        .expect(1)
        .mount(&server)
        .await;

    client().validate_token(&endpoint(&server)).await.unwrap();
}

#[tokio::test]
async fn insufficient_scope_is_forbidden() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/user"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"error": "insufficient_scope"})))
        .mount(&server)
        .await;

    let err = client()
        .validate_token(&endpoint(&server))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Forbidden);
}

#[tokio::test]
async fn project_lookup_encodes_the_namespaced_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/group%2Fsub%2Fapp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 77,
            "name": "app",
            "path_with_namespace": "group/sub/app",
            "web_url": "https://gitlab.example.com/group/sub/app",
            "description": "",
            "visibility": "internal",
            "last_activity_at": "2024-03-05T12:00:00Z"
        })))
        .mount(&server)
        .await;

    let record = client()
        .fetch_repository(&endpoint(&server), "group/sub/app")
        .await
        .unwrap();
    assert_eq!(record.api_id, "77");
    assert_eq!(record.full_name, "group/sub/app");
    assert!(record.is_private);
    assert!(record.description.is_none());
    assert!(record.language.is_none());
}

#[tokio::test]
async fn issues_follow_next_page_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/77/issues"))
        .and(query_param("page", "1"))
        .and(query_param("scope", "all"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-next-page", "2")
                .set_body_json(json!([{
                    "id": 5001, "iid": 3, "title": "Broken build",
                    "author": {"username": "tanuki"}, "state": "opened",
                    "labels": ["ci", "bug"], "assignees": [{"username": "Reviewer"}],
                    "web_url": "https://gitlab.example.com/group/sub/app/-/issues/3",
                    "closed_at": null,
                    "created_at": "2024-03-01T00:00:00Z", "updated_at": "2024-03-02T00:00:00Z"
                }])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/77/issues"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-next-page", "")
                .set_body_json(json!([])),
        )
        .mount(&server)
        .await;

    let first = client()
        .fetch_issues(&endpoint(&server), &project(), page(1))
        .await
        .unwrap();
    assert!(first.has_more);
    let issue = &first.items[0];
    assert_eq!(issue.api_id, "5001");
    assert_eq!(issue.number, 3);
    assert_eq!(issue.native_state, "opened");
    assert_eq!(issue.labels, vec!["ci".to_string(), "bug".to_string()]);
    assert_eq!(issue.assignees, vec!["Reviewer".to_string()]);

    let second = client()
        .fetch_issues(&endpoint(&server), &project(), page(2))
        .await
        .unwrap();
    assert!(!second.has_more);
    assert!(second.items.is_empty());
}

#[tokio::test]
async fn merge_requests_map_work_in_progress_to_draft() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/77/merge_requests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 81, "iid": 9, "title": "WIP: refactor", "author": {"username": "tanuki"},
                "state": "opened", "work_in_progress": true, "assignees": [],
                "web_url": "https://gitlab.example.com/group/sub/app/-/merge_requests/9",
                "merged_at": null, "closed_at": null,
                "created_at": "2024-03-01T00:00:00Z", "updated_at": "2024-03-02T00:00:00Z"
            },
            {
                "id": 82, "iid": 10, "title": "Ship it", "author": null,
                "state": "merged", "draft": false, "assignees": [],
                "web_url": "https://gitlab.example.com/group/sub/app/-/merge_requests/10",
                "merged_at": "2024-03-03T00:00:00Z", "closed_at": null,
                "created_at": "2024-03-01T00:00:00Z", "updated_at": "2024-03-03T00:00:00Z"
            }
        ])))
        .mount(&server)
        .await;

    let page = client()
        .fetch_pull_requests(&endpoint(&server), &project(), page(1))
        .await
        .unwrap();
    assert!(!page.has_more);
    assert!(page.items[0].draft);
    assert_eq!(page.items[1].native_state, "merged");
    assert_eq!(page.items[1].author, "ghost");
}

#[tokio::test]
async fn pipelines_become_workflow_runs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/77/pipelines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 3100, "status": "failed", "name": null, "user": {"username": "tanuki"},
                "web_url": "https://gitlab.example.com/group/sub/app/-/pipelines/3100",
                "created_at": "2024-03-04T00:00:00Z", "updated_at": "2024-03-04T00:10:00Z"
            },
            {
                "id": 3101, "status": "running", "name": "nightly", "user": null,
                "web_url": "https://gitlab.example.com/group/sub/app/-/pipelines/3101",
                "created_at": "2024-03-04T01:00:00Z", "updated_at": "2024-03-04T01:00:00Z"
            }
        ])))
        .mount(&server)
        .await;

    let page = client()
        .fetch_workflow_runs(&endpoint(&server), &project(), page(1))
        .await
        .unwrap();
    assert_eq!(page.items[0].name, "Pipeline #3100");
    assert_eq!(page.items[0].native_status, "failed");
    assert!(page.items[0].conclusion.is_none());
    assert_eq!(page.items[0].author.as_deref(), Some("tanuki"));
    assert_eq!(page.items[1].name, "nightly");
}

#[tokio::test]
async fn server_errors_are_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/77/pipelines"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client()
        .fetch_workflow_runs(&endpoint(&server), &project(), page(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Unreachable);
}
