//! GitLab REST (v4) client.
//!
//! `api_base_url` is expected to end in `/api/v4`. Pagination follows the
//! `X-Next-Page` header.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::RequestBuilder;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::http::{self, endpoint_url};
use super::trait_::{
    FetchError, IssueRecord, Page, PageRequest, ProviderApi, ProviderEndpoint, PullRequestRecord,
    RepositoryRecord, RepositoryRef, WorkflowRunRecord,
};
use crate::normalization::ProviderKind;

const PROVIDER: &str = "gitlab";

#[derive(Debug, Deserialize)]
struct GitLabUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    id: i64,
    name: String,
    path_with_namespace: String,
    web_url: String,
    description: Option<String>,
    visibility: Option<String>,
    last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GitLabIssue {
    id: i64,
    iid: i64,
    title: String,
    author: Option<GitLabUser>,
    state: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    assignees: Vec<GitLabUser>,
    web_url: String,
    closed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GitLabMergeRequest {
    id: i64,
    iid: i64,
    title: String,
    author: Option<GitLabUser>,
    state: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    work_in_progress: bool,
    #[serde(default)]
    assignees: Vec<GitLabUser>,
    web_url: String,
    merged_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GitLabPipeline {
    id: i64,
    status: String,
    name: Option<String>,
    user: Option<GitLabUser>,
    web_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn username(user: Option<GitLabUser>) -> String {
    user.map(|u| u.username)
        .unwrap_or_else(|| "ghost".to_string())
}

#[derive(Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
}

impl GitLabClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn get(&self, endpoint: &ProviderEndpoint, url: Url) -> RequestBuilder {
        self.http
            .get(url)
            .header("PRIVATE-TOKEN", endpoint.token.expose())
    }

    /// `{api}/projects/{id}{suffix}` with the standard paging parameters.
    fn project_url(
        endpoint: &ProviderEndpoint,
        repository: &RepositoryRef,
        suffix: &str,
        page: PageRequest,
    ) -> Result<Url, FetchError> {
        let path = format!("/projects/{}{}", repository.api_id, suffix);
        let mut url = endpoint_url(&endpoint.api_base_url, &path)?;
        url.query_pairs_mut()
            .append_pair("per_page", &page.per_page.to_string())
            .append_pair("page", &page.page.to_string());
        if let Some(since) = page.since {
            url.query_pairs_mut()
                .append_pair("updated_after", &since.to_rfc3339());
        }
        Ok(url)
    }

    fn has_next_page(response: &reqwest::Response) -> bool {
        http::header_str(response.headers(), "x-next-page").is_some_and(|v| !v.trim().is_empty())
    }
}

#[async_trait]
impl ProviderApi for GitLabClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gitlab
    }

    #[instrument(skip_all, fields(api = %endpoint.api_base_url))]
    async fn validate_token(&self, endpoint: &ProviderEndpoint) -> Result<(), FetchError> {
        let url = endpoint_url(&endpoint.api_base_url, "/user")?;
        let response = http::send(PROVIDER, self.get(endpoint, url)).await?;
        let user: GitLabUser = http::decode(PROVIDER, response).await?;
        debug!(username = %user.username, "GitLab token accepted");
        Ok(())
    }

    async fn fetch_repository(
        &self,
        endpoint: &ProviderEndpoint,
        full_name: &str,
    ) -> Result<RepositoryRecord, FetchError> {
        let mut url = endpoint_url(&endpoint.api_base_url, "/projects")?;
        // The namespaced path is a single, percent-encoded segment.
        url.path_segments_mut()
            .map_err(|_| FetchError::malformed("API base URL cannot carry a path"))?
            .push(full_name);

        let response = http::send(PROVIDER, self.get(endpoint, url)).await?;
        let project: GitLabProject = http::decode(PROVIDER, response).await?;

        Ok(RepositoryRecord {
            api_id: project.id.to_string(),
            name: project.name,
            full_name: project.path_with_namespace,
            web_url: project.web_url,
            description: project.description.filter(|d| !d.is_empty()),
            is_private: project.visibility.as_deref() != Some("public"),
            language: None,
            last_activity_at: project.last_activity_at,
        })
    }

    #[instrument(skip_all, fields(repo = %repository.full_name, page = page.page))]
    async fn fetch_issues(
        &self,
        endpoint: &ProviderEndpoint,
        repository: &RepositoryRef,
        page: PageRequest,
    ) -> Result<Page<IssueRecord>, FetchError> {
        let mut url = Self::project_url(endpoint, repository, "/issues", page)?;
        url.query_pairs_mut().append_pair("scope", "all");

        let response = http::send(PROVIDER, self.get(endpoint, url)).await?;
        let has_more = Self::has_next_page(&response);
        let issues: Vec<GitLabIssue> = http::decode(PROVIDER, response).await?;

        let items = issues
            .into_iter()
            .map(|issue| IssueRecord {
                api_id: issue.id.to_string(),
                number: issue.iid,
                title: issue.title,
                author: username(issue.author),
                native_state: issue.state,
                labels: issue.labels,
                assignees: issue.assignees.into_iter().map(|u| u.username).collect(),
                url: issue.web_url,
                closed_at: issue.closed_at,
                created_at: issue.created_at,
                updated_at: issue.updated_at,
            })
            .collect();

        Ok(Page { items, has_more })
    }

    #[instrument(skip_all, fields(repo = %repository.full_name, page = page.page))]
    async fn fetch_pull_requests(
        &self,
        endpoint: &ProviderEndpoint,
        repository: &RepositoryRef,
        page: PageRequest,
    ) -> Result<Page<PullRequestRecord>, FetchError> {
        let mut url = Self::project_url(endpoint, repository, "/merge_requests", page)?;
        url.query_pairs_mut().append_pair("scope", "all");

        let response = http::send(PROVIDER, self.get(endpoint, url)).await?;
        let has_more = Self::has_next_page(&response);
        let merge_requests: Vec<GitLabMergeRequest> = http::decode(PROVIDER, response).await?;

        let items = merge_requests
            .into_iter()
            .map(|mr| PullRequestRecord {
                api_id: mr.id.to_string(),
                number: mr.iid,
                title: mr.title,
                author: username(mr.author),
                native_state: mr.state,
                draft: mr.draft || mr.work_in_progress,
                assignees: mr.assignees.into_iter().map(|u| u.username).collect(),
                url: mr.web_url,
                merged_at: mr.merged_at,
                closed_at: mr.closed_at,
                created_at: mr.created_at,
                updated_at: mr.updated_at,
            })
            .collect();

        Ok(Page { items, has_more })
    }

    /// Pipelines have no conclusion; their status is terminal on its own.
    #[instrument(skip_all, fields(repo = %repository.full_name, page = page.page))]
    async fn fetch_workflow_runs(
        &self,
        endpoint: &ProviderEndpoint,
        repository: &RepositoryRef,
        page: PageRequest,
    ) -> Result<Page<WorkflowRunRecord>, FetchError> {
        let url = Self::project_url(endpoint, repository, "/pipelines", page)?;

        let response = http::send(PROVIDER, self.get(endpoint, url)).await?;
        let has_more = Self::has_next_page(&response);
        let pipelines: Vec<GitLabPipeline> = http::decode(PROVIDER, response).await?;

        let items = pipelines
            .into_iter()
            .map(|pipeline| WorkflowRunRecord {
                api_id: pipeline.id.to_string(),
                name: pipeline
                    .name
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| format!("Pipeline #{}", pipeline.id)),
                native_status: pipeline.status,
                conclusion: None,
                author: pipeline.user.map(|u| u.username),
                url: pipeline.web_url,
                created_at: pipeline.created_at,
                updated_at: pipeline.updated_at,
            })
            .collect();

        Ok(Page { items, has_more })
    }
}
