//! Credential vault
//!
//! Token validation against the provider API. `token_valid` is only ever
//! written here, from the outcome of an explicit probe.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::connectors::ApiRegistry;
use crate::error::{EngineError, EngineResult};
use crate::models::provider;
use crate::repositories::ProviderRepository;

#[derive(Clone)]
pub struct CredentialVault {
    providers: ProviderRepository,
    apis: Arc<ApiRegistry>,
}

impl CredentialVault {
    pub fn new(providers: ProviderRepository, apis: Arc<ApiRegistry>) -> Self {
        Self { providers, apis }
    }

    pub fn providers(&self) -> &ProviderRepository {
        &self.providers
    }

    /// Probes the provider with its stored token.
    ///
    /// - accepted: `token_valid = true`, returns `Ok(true)`
    /// - rejected (401/403) or no token: `token_valid = false`, returns the
    ///   typed error
    /// - unreachable, timed out, rate limited: flag untouched, returns the
    ///   typed error
    #[instrument(skip(self), fields(provider_id = id))]
    pub async fn validate_token(&self, id: i32) -> EngineResult<bool> {
        let model = self.providers.get(id).await?;
        self.validate_model(&model).await
    }

    /// Like [`Self::validate_token`] but reports any failure as `false`.
    pub async fn check_token(&self, id: i32) -> EngineResult<bool> {
        match self.validate_token(id).await {
            Ok(valid) => Ok(valid),
            Err(err @ EngineError::NotFound {
                entity: "provider", ..
            }) => Err(err),
            Err(err) => {
                info!(provider_id = id, reason = err.reason(), "Token check failed");
                Ok(false)
            }
        }
    }

    /// Revalidates only when the cached flag is false.
    pub async fn ensure_valid(&self, model: &provider::Model) -> EngineResult<()> {
        if model.token_valid {
            return Ok(());
        }
        self.validate_model(model).await.map(|_| ())
    }

    async fn validate_model(&self, model: &provider::Model) -> EngineResult<bool> {
        let endpoint = match self.providers.endpoint(model) {
            Ok(endpoint) => endpoint,
            Err(err @ EngineError::Unauthorized(_)) | Err(err @ EngineError::Crypto(_)) => {
                warn!(provider_id = model.id, reason = err.reason(), "Provider token unusable");
                self.providers.set_token_validity(model.id, false).await?;
                return Err(match err {
                    EngineError::Crypto(_) => {
                        EngineError::Unauthorized("stored token could not be decrypted".into())
                    }
                    other => other,
                });
            }
            Err(err) => return Err(err),
        };

        let api = self
            .apis
            .get(endpoint.kind)
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        match api.validate_token(&endpoint).await {
            Ok(()) => {
                self.providers.set_token_validity(model.id, true).await?;
                info!(provider_id = model.id, "Provider token validated");
                Ok(true)
            }
            Err(err) if err.is_auth_failure() => {
                self.providers.set_token_validity(model.id, false).await?;
                warn!(provider_id = model.id, error = %err, "Provider token rejected");
                Err(err.into())
            }
            Err(err) => {
                warn!(
                    provider_id = model.id,
                    error = %err,
                    "Provider token could not be checked"
                );
                Err(err.into())
            }
        }
    }
}
