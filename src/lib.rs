//! Sysdig Provider
//!
//! A desired-state reconciliation provider for Sysdig Monitor and Sysdig
//! Secure. Each managed resource type (teams, zones, Falco rules, alerts,
//! notification channels, ...) is exposed through the same contract: plan a
//! change from prior and proposed state, then create, read, update, delete or
//! import the remote entity.
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **Schema types**: Attribute and block schemas for the provider config, resources and data sources
//! - **ProviderService trait**: The reconciliation contract an orchestrator drives
//! - **SysdigProvider**: The registry of every Sysdig resource and data source
//! - **HTTP client**: Per-product endpoints with token or IBM IAM auth, retries and backoff
//! - **Error types**: A status-classified error type shared by every operation
//! - **Logging**: Integration with `tracing` for structured logging
//! - **Testing**: An in-memory backend and a lifecycle harness
//!
//! # Quick Start
//!
//! ```ignore
//! use sysdig_provider::{ProviderService, SysdigProvider};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     sysdig_provider::init_logging();
//!
//!     let provider = SysdigProvider::new();
//!     provider
//!         .configure(json!({"sysdig_secure_url": "https://secure.sysdig.com"}))
//!         .await?;
//!
//!     let proposed = json!({"name": "shells", "items": ["bash", "zsh"]});
//!     let plan = provider.plan("sysdig_secure_list", None, proposed).await?;
//!     let state = provider.create("sysdig_secure_list", plan.planned_state).await?;
//!     println!("{}", state["id"]);
//!     Ok(())
//! }
//! ```
//!
//! # Provider Contract
//!
//! - **ValidateProviderConfig / Configure**: Resolve endpoints and credentials, config first, then environment
//! - **ValidateResourceConfig**: Schema checks plus per-resource rules
//! - **Plan**: Fills defaults, carries computed values forward and flags replacement
//! - **Create/Read/Update/Delete**: CRUD against the Sysdig API; a vanished entity reads as `None`
//! - **Refresh**: Read plus drift against the recorded state
//! - **ImportResourceState**: Builds state from a remote identifier
//! - **ValidateDataSourceConfig / ReadDataSource**: Lookups of existing entities

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod data_sources;
pub mod error;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod service;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{ApiRequest, HttpClient, RetryPolicy, SysdigApi};
pub use config::{Product, ProviderConfig};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::SysdigProvider;
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, RefreshResult,
};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
