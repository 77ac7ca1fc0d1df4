//! # Repository Layer
//!
//! Persistence services over the sea-orm entities: provider profiles with
//! sealed tokens, source repositories and their sync metadata, resource
//! upserts and the sync history ledger.

pub mod provider;
pub mod repository;
pub mod resources;
pub mod sync_history;

pub use provider::{NewProvider, ProviderRepository};
pub use repository::RepositoryStore;
pub use sync_history::{SyncCounts, SyncHistoryRepository};
