//! Status normalization.
//!
//! Providers report issue, pull request and workflow states in their own
//! vocabularies. Everything written to the store goes through this module
//! first, so readers only ever see the canonical enums below. Each provider
//! kind owns a [`Dialect`] table; supporting a new provider means adding a
//! table, not touching call sites.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Supported provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Github,
    Gitlab,
}

impl ProviderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Github => "github",
            ProviderKind::Gitlab => "gitlab",
        }
    }

    /// Status vocabulary spoken by this provider.
    pub const fn dialect(self) -> &'static Dialect {
        match self {
            ProviderKind::Github => &GITHUB_DIALECT,
            ProviderKind::Gitlab => &GITLAB_DIALECT,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = NormalizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(ProviderKind::Github),
            "gitlab" => Ok(ProviderKind::Gitlab),
            other => Err(NormalizationError::UnknownProviderKind(other.to_string())),
        }
    }
}

/// The three independently synced resource kinds of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Issues,
    PullRequests,
    Workflows,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Issues,
        ResourceKind::PullRequests,
        ResourceKind::Workflows,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Issues => "issues",
            ResourceKind::PullRequests => "pull_requests",
            ResourceKind::Workflows => "workflows",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical issue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub const ALL: [IssueState; 2] = [IssueState::Open, IssueState::Closed];

    pub const fn as_str(self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
        }
    }
}

/// Canonical pull request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

impl PullRequestState {
    pub const ALL: [PullRequestState; 3] = [
        PullRequestState::Open,
        PullRequestState::Closed,
        PullRequestState::Merged,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            PullRequestState::Open => "open",
            PullRequestState::Closed => "closed",
            PullRequestState::Merged => "merged",
        }
    }
}

/// Canonical (effective) workflow run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Success,
    Failure,
    InProgress,
    Cancelled,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 4] = [
        WorkflowState::Success,
        WorkflowState::Failure,
        WorkflowState::InProgress,
        WorkflowState::Cancelled,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Success => "success",
            WorkflowState::Failure => "failure",
            WorkflowState::InProgress => "in_progress",
            WorkflowState::Cancelled => "cancelled",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),+) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })+
    };
}

display_as_str!(IssueState, PullRequestState, WorkflowState);

/// Errors raised while parsing canonical vocabulary from user input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("unknown provider kind: {0}")]
    UnknownProviderKind(String),
    #[error("unknown {resource} state: {value}")]
    UnknownState {
        resource: &'static str,
        value: String,
    },
}

/// Native vocabulary of one provider family.
#[derive(Debug)]
pub struct Dialect {
    /// Issue states meaning "closed"; anything else is open.
    pub issue_closed: &'static [&'static str],
    /// Pull request states meaning "merged".
    pub pr_merged: &'static [&'static str],
    /// Pull request states meaning "closed without merge".
    pub pr_closed: &'static [&'static str],
    pub workflow: WorkflowDialect,
}

/// Workflow status table, consulted in field order.
#[derive(Debug)]
pub struct WorkflowDialect {
    /// Statuses of a run that has not finished, whatever the conclusion says.
    pub running: &'static [&'static str],
    pub cancelled: &'static [&'static str],
    /// Terminal statuses that are successful on their own.
    pub succeeded: &'static [&'static str],
    /// Terminal statuses that are failed on their own.
    pub failed: &'static [&'static str],
    /// Terminal statuses whose outcome lives in the conclusion.
    pub completed: &'static [&'static str],
}

pub static GITHUB_DIALECT: Dialect = Dialect {
    issue_closed: &["closed"],
    pr_merged: &["merged"],
    pr_closed: &["closed"],
    workflow: WorkflowDialect {
        running: &[
            "in_progress",
            "queued",
            "requested",
            "waiting",
            "pending",
        ],
        cancelled: &["cancelled"],
        succeeded: &[],
        failed: &[],
        completed: &["completed"],
    },
};

pub static GITLAB_DIALECT: Dialect = Dialect {
    issue_closed: &["closed"],
    pr_merged: &["merged"],
    pr_closed: &["closed"],
    workflow: WorkflowDialect {
        running: &[
            "created",
            "waiting_for_resource",
            "preparing",
            "pending",
            "running",
            "scheduled",
            "manual",
        ],
        cancelled: &["canceled", "cancelled", "skipped"],
        succeeded: &["success"],
        failed: &["failed"],
        completed: &[],
    },
};

fn canon(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

impl Dialect {
    pub fn issue_state(&self, native: &str) -> IssueState {
        if self.issue_closed.contains(&canon(native).as_str()) {
            IssueState::Closed
        } else {
            IssueState::Open
        }
    }

    /// `merged` covers providers that report a merged PR as plain `closed`
    /// with a merge timestamp.
    pub fn pull_request_state(&self, native: &str, merged: bool) -> PullRequestState {
        let native = canon(native);
        if merged || self.pr_merged.contains(&native.as_str()) {
            PullRequestState::Merged
        } else if self.pr_closed.contains(&native.as_str()) {
            PullRequestState::Closed
        } else {
            PullRequestState::Open
        }
    }

    pub fn workflow_state(&self, status: &str, conclusion: Option<&str>) -> WorkflowState {
        self.workflow.resolve(status, conclusion)
    }
}

impl WorkflowDialect {
    /// Total mapping of a native `(status, conclusion)` pair. Unknown input
    /// resolves to `InProgress` unless the run is known to be finished.
    pub fn resolve(&self, status: &str, conclusion: Option<&str>) -> WorkflowState {
        let status = canon(status);
        let conclusion = conclusion.map(canon);
        let status = status.as_str();

        if self.running.contains(&status) {
            return WorkflowState::InProgress;
        }
        if self.cancelled.contains(&status) {
            return WorkflowState::Cancelled;
        }
        if self.succeeded.contains(&status) {
            return WorkflowState::Success;
        }
        if self.failed.contains(&status) {
            return WorkflowState::Failure;
        }
        if self.completed.contains(&status) {
            return match conclusion.as_deref() {
                Some("success") => WorkflowState::Success,
                Some("cancelled") | Some("canceled") => WorkflowState::Cancelled,
                _ => WorkflowState::Failure,
            };
        }
        match conclusion.as_deref() {
            Some("cancelled") | Some("canceled") => WorkflowState::Cancelled,
            _ => WorkflowState::InProgress,
        }
    }
}

/// Unicode lower-casing used for every stored search column and every
/// filter term, so comparisons never depend on the database's `LOWER()`.
pub fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

/// Parse a user-supplied state filter; `all` and the empty string mean no filter.
pub fn parse_state_filter<T: Copy>(
    resource: &'static str,
    value: Option<&str>,
    variants: &[T],
    as_str: fn(T) -> &'static str,
) -> Result<Option<T>, NormalizationError> {
    let Some(raw) = value.map(canon) else {
        return Ok(None);
    };
    if raw.is_empty() || raw == "all" {
        return Ok(None);
    }
    variants
        .iter()
        .copied()
        .find(|v| as_str(*v) == raw)
        .map(Some)
        .ok_or(NormalizationError::UnknownState {
            resource,
            value: raw,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_case_handles_non_ascii_letters() {
        assert_eq!(fold_case("ÄRGER mit Éclair"), "ärger mit éclair");
        assert_eq!(fold_case("Straße"), "straße");
    }

    const GITHUB_STATUSES: &[&str] = &[
        "in_progress",
        "queued",
        "requested",
        "waiting",
        "pending",
        "completed",
        "cancelled",
        "unknown_status",
        "",
    ];
    const GITHUB_CONCLUSIONS: &[Option<&str>] = &[
        None,
        Some("success"),
        Some("failure"),
        Some("cancelled"),
        Some("timed_out"),
        Some("skipped"),
        Some("neutral"),
        Some("action_required"),
        Some(""),
    ];
    const GITLAB_STATUSES: &[&str] = &[
        "created",
        "waiting_for_resource",
        "preparing",
        "pending",
        "running",
        "success",
        "failed",
        "canceled",
        "skipped",
        "manual",
        "scheduled",
        "something_new",
    ];

    #[test]
    fn every_github_pair_maps_to_a_canonical_state() {
        for status in GITHUB_STATUSES {
            for conclusion in GITHUB_CONCLUSIONS {
                let state = GITHUB_DIALECT.workflow_state(status, *conclusion);
                assert!(WorkflowState::ALL.contains(&state));
            }
        }
    }

    #[test]
    fn running_statuses_ignore_conclusion() {
        for kind in [ProviderKind::Github, ProviderKind::Gitlab] {
            let dialect = kind.dialect();
            for status in dialect.workflow.running {
                for conclusion in GITHUB_CONCLUSIONS {
                    assert_eq!(
                        dialect.workflow_state(status, *conclusion),
                        WorkflowState::InProgress,
                        "{kind} {status} {conclusion:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn github_completed_runs_follow_conclusion() {
        let d = &GITHUB_DIALECT;
        assert_eq!(
            d.workflow_state("completed", Some("success")),
            WorkflowState::Success
        );
        assert_eq!(
            d.workflow_state("completed", Some("cancelled")),
            WorkflowState::Cancelled
        );
        for conclusion in ["failure", "timed_out", "skipped", "neutral", "bogus"] {
            assert_eq!(
                d.workflow_state("completed", Some(conclusion)),
                WorkflowState::Failure
            );
        }
        assert_eq!(d.workflow_state("completed", None), WorkflowState::Failure);
    }

    #[test]
    fn github_unknown_status_fails_open() {
        let d = &GITHUB_DIALECT;
        assert_eq!(
            d.workflow_state("mystery", Some("failure")),
            WorkflowState::InProgress
        );
        assert_eq!(d.workflow_state("mystery", None), WorkflowState::InProgress);
        assert_eq!(
            d.workflow_state("mystery", Some("cancelled")),
            WorkflowState::Cancelled
        );
        assert_eq!(
            d.workflow_state("cancelled", None),
            WorkflowState::Cancelled
        );
    }

    #[test]
    fn input_is_case_and_whitespace_insensitive() {
        assert_eq!(
            GITHUB_DIALECT.workflow_state(" Completed ", Some("SUCCESS")),
            WorkflowState::Success
        );
        assert_eq!(
            GITLAB_DIALECT.workflow_state("Running", None),
            WorkflowState::InProgress
        );
    }

    #[test]
    fn gitlab_pipeline_statuses() {
        let d = &GITLAB_DIALECT;
        let expected = [
            ("created", WorkflowState::InProgress),
            ("waiting_for_resource", WorkflowState::InProgress),
            ("preparing", WorkflowState::InProgress),
            ("pending", WorkflowState::InProgress),
            ("running", WorkflowState::InProgress),
            ("manual", WorkflowState::InProgress),
            ("scheduled", WorkflowState::InProgress),
            ("success", WorkflowState::Success),
            ("failed", WorkflowState::Failure),
            ("canceled", WorkflowState::Cancelled),
            ("skipped", WorkflowState::Cancelled),
            ("something_new", WorkflowState::InProgress),
        ];
        for (status, state) in expected {
            assert_eq!(d.workflow_state(status, None), state, "{status}");
        }
        for status in GITLAB_STATUSES {
            assert!(WorkflowState::ALL.contains(&d.workflow_state(status, None)));
        }
    }

    #[test]
    fn issue_states() {
        assert_eq!(GITHUB_DIALECT.issue_state("open"), IssueState::Open);
        assert_eq!(GITHUB_DIALECT.issue_state("closed"), IssueState::Closed);
        assert_eq!(GITLAB_DIALECT.issue_state("opened"), IssueState::Open);
        assert_eq!(GITLAB_DIALECT.issue_state("reopened"), IssueState::Open);
        assert_eq!(GITLAB_DIALECT.issue_state("closed"), IssueState::Closed);
        assert_eq!(GITLAB_DIALECT.issue_state("weird"), IssueState::Open);
    }

    #[test]
    fn pull_request_states() {
        let gh = &GITHUB_DIALECT;
        assert_eq!(gh.pull_request_state("open", false), PullRequestState::Open);
        assert_eq!(
            gh.pull_request_state("closed", false),
            PullRequestState::Closed
        );
        assert_eq!(
            gh.pull_request_state("closed", true),
            PullRequestState::Merged
        );

        let gl = &GITLAB_DIALECT;
        assert_eq!(
            gl.pull_request_state("merged", false),
            PullRequestState::Merged
        );
        assert_eq!(gl.pull_request_state("locked", false), PullRequestState::Open);
        assert_eq!(gl.pull_request_state("opened", false), PullRequestState::Open);
    }

    #[test]
    fn provider_kind_parses_case_insensitively() {
        assert_eq!("GitHub".parse::<ProviderKind>(), Ok(ProviderKind::Github));
        assert_eq!(" gitlab ".parse::<ProviderKind>(), Ok(ProviderKind::Gitlab));
        assert!("bitbucket".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn state_filter_accepts_all_and_rejects_unknown() {
        let parse = |v| {
            parse_state_filter("issue", v, &IssueState::ALL, IssueState::as_str)
        };
        assert_eq!(parse(None), Ok(None));
        assert_eq!(parse(Some("all")), Ok(None));
        assert_eq!(parse(Some("")), Ok(None));
        assert_eq!(parse(Some("Closed")), Ok(Some(IssueState::Closed)));
        assert!(parse(Some("merged")).is_err());
    }
}
