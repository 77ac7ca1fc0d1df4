//! Provider repository for database operations
//!
//! Stores provider connection profiles. Tokens only ever reach the database
//! sealed with the configured [`CryptoKey`]; plaintext stays in
//! [`SecretToken`] values that are never logged.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::connectors::ProviderEndpoint;
use crate::crypto::{CryptoKey, SecretToken, is_sealed_payload, open_token, seal_token};
use crate::error::{EngineError, EngineResult, conflict_or_db};
use crate::models::provider::{self, Entity as Provider};
use crate::models::{issue, pull_request, repository, workflow_run};
use crate::normalization::{ProviderKind, fold_case};

const MAX_NAME_LEN: usize = 100;

/// Input for [`ProviderRepository::register`].
#[derive(Debug, Clone)]
pub struct NewProvider {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_base_url: String,
    pub token: Option<SecretToken>,
}

/// Repository for provider database operations
#[derive(Debug, Clone)]
pub struct ProviderRepository {
    pub db: Arc<DatabaseConnection>,
    crypto_key: CryptoKey,
}

impl ProviderRepository {
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Creates a provider. The token, when given, is sealed before insert and
    /// starts out as not validated.
    pub async fn register(&self, input: NewProvider) -> EngineResult<provider::Model> {
        let name = validate_name(&input.name)?;
        let base_url = normalize_url("base_url", &input.base_url)?;
        let api_base_url = normalize_url("api_base_url", &input.api_base_url)?;

        let token_ciphertext = input
            .token
            .as_ref()
            .filter(|t| !t.expose().trim().is_empty())
            .map(|t| seal_token(&self.crypto_key, input.kind.as_str(), &name, t))
            .transpose()?;

        let now = Utc::now().fixed_offset();
        let model = provider::ActiveModel {
            name_folded: Set(fold_case(&name)),
            name: Set(name),
            kind: Set(input.kind.as_str().to_string()),
            base_url: Set(base_url),
            api_base_url: Set(api_base_url),
            token_ciphertext: Set(token_ciphertext),
            token_valid: Set(false),
            token_validated_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| conflict_or_db(e, "provider with this name"))?;

        info!(
            provider_id = model.id,
            kind = %model.kind,
            has_token = model.token_ciphertext.is_some(),
            "Provider registered"
        );
        Ok(model)
    }

    pub async fn get(&self, id: i32) -> EngineResult<provider::Model> {
        Provider::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("provider", id))
    }

    /// All providers ordered by id.
    pub async fn list(&self) -> EngineResult<Vec<provider::Model>> {
        Ok(Provider::find()
            .order_by_asc(provider::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Replaces (or clears) the stored token. Validity resets to false until
    /// the next explicit validation.
    pub async fn update_token(
        &self,
        id: i32,
        token: Option<SecretToken>,
    ) -> EngineResult<provider::Model> {
        let existing = self.get(id).await?;
        let sealed = token
            .as_ref()
            .filter(|t| !t.expose().trim().is_empty())
            .map(|t| seal_token(&self.crypto_key, &existing.kind, &existing.name, t))
            .transpose()?;
        let cleared = sealed.is_none();

        let mut active = existing.into_active_model();
        active.token_ciphertext = Set(sealed);
        active.token_valid = Set(false);
        active.token_validated_at = Set(None);
        active.updated_at = Set(Utc::now().fixed_offset());
        let updated = active.update(&*self.db).await?;

        info!(provider_id = id, cleared, "Provider token replaced");
        Ok(updated)
    }

    /// Records the outcome of an explicit token validation.
    pub async fn set_token_validity(&self, id: i32, valid: bool) -> EngineResult<provider::Model> {
        let existing = self.get(id).await?;
        let now = Utc::now().fixed_offset();
        let mut active = existing.into_active_model();
        active.token_valid = Set(valid);
        active.token_validated_at = Set(Some(now));
        active.updated_at = Set(now);
        Ok(active.update(&*self.db).await?)
    }

    /// Decrypts the stored token, if any.
    pub fn open_token(&self, model: &provider::Model) -> EngineResult<Option<SecretToken>> {
        let Some(sealed) = model.token_ciphertext.as_deref() else {
            return Ok(None);
        };
        if !is_sealed_payload(sealed) {
            warn!(provider_id = model.id, "Stored token is not in sealed format");
        }
        open_token(&self.crypto_key, &model.kind, &model.name, sealed)
            .map(Some)
            .map_err(|e| {
                warn!(provider_id = model.id, "Token decryption failed");
                EngineError::Crypto(e)
            })
    }

    /// Everything a connector needs to call this provider. Fails with
    /// `Unauthorized` when no token is configured.
    pub fn endpoint(&self, model: &provider::Model) -> EngineResult<ProviderEndpoint> {
        let kind: ProviderKind = model.kind.parse()?;
        let token = self
            .open_token(model)?
            .ok_or_else(|| EngineError::Unauthorized("provider has no token configured".into()))?;
        Ok(ProviderEndpoint {
            kind,
            api_base_url: model.api_base_url.clone(),
            token,
        })
    }

    /// Deletes the provider with its repositories and their synced resources.
    pub async fn delete(&self, id: i32) -> EngineResult<()> {
        let existing = self.get(id).await?;

        let txn = self.db.begin().await?;
        let repository_ids: Vec<i32> = repository::Entity::find()
            .filter(repository::Column::ProviderId.eq(id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        if !repository_ids.is_empty() {
            issue::Entity::delete_many()
                .filter(issue::Column::RepositoryId.is_in(repository_ids.clone()))
                .exec(&txn)
                .await?;
            pull_request::Entity::delete_many()
                .filter(pull_request::Column::RepositoryId.is_in(repository_ids.clone()))
                .exec(&txn)
                .await?;
            workflow_run::Entity::delete_many()
                .filter(workflow_run::Column::RepositoryId.is_in(repository_ids.clone()))
                .exec(&txn)
                .await?;
            repository::Entity::delete_many()
                .filter(repository::Column::ProviderId.eq(id))
                .exec(&txn)
                .await?;
        }
        Provider::delete_by_id(existing.id).exec(&txn).await?;
        txn.commit().await?;

        info!(
            provider_id = id,
            repositories = repository_ids.len(),
            "Provider deleted"
        );
        Ok(())
    }
}

fn validate_name(raw: &str) -> EngineResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(EngineError::Validation("name must not be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Parses an http(s) URL and drops any trailing slash.
pub(crate) fn normalize_url(field: &str, raw: &str) -> EngineResult<String> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed)
        .map_err(|e| EngineError::Validation(format!("{field} is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(EngineError::Validation(format!(
            "{field} must be an http(s) URL"
        )));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}
