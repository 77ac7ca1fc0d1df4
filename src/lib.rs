//! # gitportal
//!
//! Sync engine and query API that mirrors issues, pull requests and workflow
//! runs from GitHub and GitLab instances into a local database.

pub mod config;
pub mod connectors;
pub mod credentials;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod normalization;
pub mod query;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod settings;
pub mod sync_lock;
pub mod sync_orchestrator;
pub mod telemetry;
pub use migration;
