//! Provider API registry
//!
//! Maps each [`ProviderKind`] to the client that speaks its API. The sync
//! engine resolves clients through here so tests can swap in scripted ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::connectors::github::GitHubClient;
use crate::connectors::gitlab::GitLabClient;
use crate::connectors::http::build_client;
use crate::connectors::trait_::ProviderApi;
use crate::normalization::ProviderKind;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("No API client registered for provider kind '{kind}'")]
    UnsupportedKind { kind: ProviderKind },
}

#[derive(Clone, Default)]
pub struct ApiRegistry {
    apis: HashMap<ProviderKind, Arc<dyn ProviderApi>>,
}

impl ApiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// GitHub and GitLab clients sharing one HTTP connection pool.
    pub fn with_http_defaults(timeout: Duration) -> reqwest::Result<Self> {
        let http = build_client(timeout)?;
        let mut registry = Self::new();
        registry.register(Arc::new(GitHubClient::new(http.clone())));
        registry.register(Arc::new(GitLabClient::new(http)));
        Ok(registry)
    }

    /// Registers `api` under its own kind, replacing any previous client.
    pub fn register(&mut self, api: Arc<dyn ProviderApi>) {
        self.apis.insert(api.kind(), api);
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn ProviderApi>, RegistryError> {
        self.apis
            .get(&kind)
            .cloned()
            .ok_or(RegistryError::UnsupportedKind { kind })
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.apis.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}
