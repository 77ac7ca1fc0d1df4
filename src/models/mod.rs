//! # Data Models
//!
//! SeaORM entities for the local projection of provider data.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod issue;
pub mod provider;
pub mod pull_request;
pub mod repository;
pub mod sync_history;
pub mod workflow_run;

pub use issue::Entity as Issue;
pub use provider::Entity as Provider;
pub use pull_request::Entity as PullRequest;
pub use repository::Entity as Repository;
pub use sync_history::Entity as SyncHistory;
pub use workflow_run::Entity as WorkflowRun;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "gitportal".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
