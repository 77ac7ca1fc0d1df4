//! GitHub REST client.
//!
//! Works against github.com (`https://api.github.com`) and GitHub Enterprise
//! (`https://host/api/v3`). Pagination follows the `Link` header.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::RequestBuilder;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::http::{self, endpoint_url};
use super::trait_::{
    FetchError, IssueRecord, Page, PageRequest, ProviderApi, ProviderEndpoint, PullRequestRecord,
    RepositoryRecord, RepositoryRef, WorkflowRunRecord,
};
use crate::normalization::ProviderKind;

const PROVIDER: &str = "github";
const ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    id: i64,
    name: String,
    full_name: String,
    html_url: String,
    description: Option<String>,
    #[serde(default)]
    private: bool,
    language: Option<String>,
    pushed_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GitHubIssue {
    id: i64,
    number: i64,
    title: String,
    user: Option<GitHubUser>,
    state: String,
    #[serde(default)]
    labels: Vec<GitHubLabel>,
    #[serde(default)]
    assignees: Vec<GitHubUser>,
    html_url: String,
    closed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Present when the "issue" is actually a pull request.
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GitHubPullRequest {
    id: i64,
    number: i64,
    title: String,
    user: Option<GitHubUser>,
    state: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    assignees: Vec<GitHubUser>,
    html_url: String,
    merged_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GitHubWorkflowRuns {
    #[serde(default)]
    workflow_runs: Vec<GitHubWorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct GitHubWorkflowRun {
    id: i64,
    name: Option<String>,
    run_number: Option<i64>,
    status: Option<String>,
    conclusion: Option<String>,
    actor: Option<GitHubUser>,
    html_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn login(user: Option<GitHubUser>) -> String {
    user.map(|u| u.login).unwrap_or_else(|| "ghost".to_string())
}

#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn get(&self, endpoint: &ProviderEndpoint, url: url::Url) -> RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(endpoint.token.expose())
            .header("Accept", ACCEPT)
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    fn paged_url(
        endpoint: &ProviderEndpoint,
        path: &str,
        page: PageRequest,
    ) -> Result<url::Url, FetchError> {
        let mut url = endpoint_url(&endpoint.api_base_url, path)?;
        url.query_pairs_mut()
            .append_pair("per_page", &page.per_page.to_string())
            .append_pair("page", &page.page.to_string());
        Ok(url)
    }
}

#[async_trait]
impl ProviderApi for GitHubClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Github
    }

    #[instrument(skip_all, fields(api = %endpoint.api_base_url))]
    async fn validate_token(&self, endpoint: &ProviderEndpoint) -> Result<(), FetchError> {
        let url = endpoint_url(&endpoint.api_base_url, "/user")?;
        let response = http::send(PROVIDER, self.get(endpoint, url)).await?;
        let user: GitHubUser = http::decode(PROVIDER, response).await?;
        debug!(login = %user.login, "GitHub token accepted");
        Ok(())
    }

    async fn fetch_repository(
        &self,
        endpoint: &ProviderEndpoint,
        full_name: &str,
    ) -> Result<RepositoryRecord, FetchError> {
        let url = endpoint_url(&endpoint.api_base_url, &format!("/repos/{full_name}"))?;
        let response = http::send(PROVIDER, self.get(endpoint, url)).await?;
        let repo: GitHubRepository = http::decode(PROVIDER, response).await?;

        Ok(RepositoryRecord {
            api_id: repo.id.to_string(),
            name: repo.name,
            full_name: repo.full_name,
            web_url: repo.html_url,
            description: repo.description,
            is_private: repo.private,
            language: repo.language,
            last_activity_at: repo.pushed_at.or(repo.updated_at),
        })
    }

    #[instrument(skip_all, fields(repo = %repository.full_name, page = page.page))]
    async fn fetch_issues(
        &self,
        endpoint: &ProviderEndpoint,
        repository: &RepositoryRef,
        page: PageRequest,
    ) -> Result<Page<IssueRecord>, FetchError> {
        let path = format!("/repos/{}/issues", repository.full_name);
        let mut url = Self::paged_url(endpoint, &path, page)?;
        url.query_pairs_mut().append_pair("state", "all");
        if let Some(since) = page.since {
            url.query_pairs_mut().append_pair("since", &since.to_rfc3339());
        }

        let response = http::send(PROVIDER, self.get(endpoint, url)).await?;
        let has_more = http::has_next_link(response.headers());
        let issues: Vec<GitHubIssue> = http::decode(PROVIDER, response).await?;

        let items = issues
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .filter(|issue| page.since.is_none_or(|since| issue.updated_at > since))
            .map(|issue| IssueRecord {
                api_id: issue.id.to_string(),
                number: issue.number,
                title: issue.title,
                author: login(issue.user),
                native_state: issue.state,
                labels: issue.labels.into_iter().map(|l| l.name).collect(),
                assignees: issue.assignees.into_iter().map(|u| u.login).collect(),
                url: issue.html_url,
                closed_at: issue.closed_at,
                created_at: issue.created_at,
                updated_at: issue.updated_at,
            })
            .collect();

        Ok(Page { items, has_more })
    }

    /// The pulls endpoint has no `since` filter; results come newest-updated
    /// first, so the first stale entry ends pagination.
    #[instrument(skip_all, fields(repo = %repository.full_name, page = page.page))]
    async fn fetch_pull_requests(
        &self,
        endpoint: &ProviderEndpoint,
        repository: &RepositoryRef,
        page: PageRequest,
    ) -> Result<Page<PullRequestRecord>, FetchError> {
        let path = format!("/repos/{}/pulls", repository.full_name);
        let mut url = Self::paged_url(endpoint, &path, page)?;
        url.query_pairs_mut()
            .append_pair("state", "all")
            .append_pair("sort", "updated")
            .append_pair("direction", "desc");

        let response = http::send(PROVIDER, self.get(endpoint, url)).await?;
        let mut has_more = http::has_next_link(response.headers());
        let pulls: Vec<GitHubPullRequest> = http::decode(PROVIDER, response).await?;

        let total = pulls.len();
        let items: Vec<PullRequestRecord> = pulls
            .into_iter()
            .filter(|pr| page.since.is_none_or(|since| pr.updated_at > since))
            .map(|pr| PullRequestRecord {
                api_id: pr.id.to_string(),
                number: pr.number,
                title: pr.title,
                author: login(pr.user),
                native_state: pr.state,
                draft: pr.draft,
                assignees: pr.assignees.into_iter().map(|u| u.login).collect(),
                url: pr.html_url,
                merged_at: pr.merged_at,
                closed_at: pr.closed_at,
                created_at: pr.created_at,
                updated_at: pr.updated_at,
            })
            .collect();

        if items.len() < total {
            has_more = false;
        }

        Ok(Page { items, has_more })
    }

    #[instrument(skip_all, fields(repo = %repository.full_name, page = page.page))]
    async fn fetch_workflow_runs(
        &self,
        endpoint: &ProviderEndpoint,
        repository: &RepositoryRef,
        page: PageRequest,
    ) -> Result<Page<WorkflowRunRecord>, FetchError> {
        let path = format!("/repos/{}/actions/runs", repository.full_name);
        let url = Self::paged_url(endpoint, &path, page)?;

        let response = http::send(PROVIDER, self.get(endpoint, url)).await?;
        let has_more = http::has_next_link(response.headers());
        let body: GitHubWorkflowRuns = http::decode(PROVIDER, response).await?;

        let items = body
            .workflow_runs
            .into_iter()
            .filter(|run| page.since.is_none_or(|since| run.updated_at > since))
            .map(|run| WorkflowRunRecord {
                api_id: run.id.to_string(),
                name: run
                    .name
                    .unwrap_or_else(|| format!("Run #{}", run.run_number.unwrap_or(run.id))),
                native_status: run.status.unwrap_or_default(),
                conclusion: run.conclusion,
                author: run.actor.map(|a| a.login),
                url: run.html_url,
                created_at: run.created_at,
                updated_at: run.updated_at,
            })
            .collect();

        Ok(Page { items, has_more })
    }
}
