//! Provider connectors
//!
//! - [`ProviderApi`]: the interface every hosting provider client implements
//! - [`ApiRegistry`]: lookup of clients by provider kind
//! - GitHub and GitLab REST implementations

pub mod github;
pub mod gitlab;
pub mod http;
pub mod registry;
pub mod trait_;

pub use github::GitHubClient;
pub use gitlab::GitLabClient;
pub use registry::{ApiRegistry, RegistryError};
pub use trait_::{
    FetchError, FetchErrorKind, IssueRecord, Page, PageRequest, ProviderApi, ProviderEndpoint,
    PullRequestRecord, RepositoryRecord, RepositoryRef, WorkflowRunRecord,
};
