//! Datastore access layer.
//!
//! - types: entity model (keys, values, queries, mutations)
//! - client: single-entity helpers and the transaction runner
//! - cloud: Google Cloud Datastore REST backend
//! - memory: in-process backend with the same transaction semantics

pub mod client;
pub mod cloud;
pub mod error;
pub mod memory;
pub mod types;

use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{DatastoreBackend, DatastoreConfig};
use crate::core::credentials::TokenSource;

pub use client::{Client, Transaction};
pub use cloud::CloudDatastore;
pub use error::DatastoreError;
pub use memory::MemoryDatastore;
pub use types::{Direction, Entity, Key, Mutation, Query, TransactionId, Value};

/// Primitive operations every backend provides.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Results are returned in the order of `keys`; `None` for missing.
    async fn lookup(
        &self,
        keys: &[Key],
        transaction: Option<&TransactionId>,
    ) -> Result<Vec<Option<Entity>>, DatastoreError>;

    /// Applies all mutations atomically and returns one key per mutation.
    /// With a transaction, fails with `Conflict` if anything the transaction
    /// read or writes changed since it began.
    async fn commit(
        &self,
        mutations: Vec<Mutation>,
        transaction: Option<&TransactionId>,
    ) -> Result<Vec<Key>, DatastoreError>;

    async fn run_query(&self, query: &Query) -> Result<Vec<Entity>, DatastoreError>;

    async fn begin_transaction(&self) -> Result<TransactionId, DatastoreError>;

    async fn rollback(&self, transaction: &TransactionId) -> Result<(), DatastoreError>;
}

/// Builds the process-wide backend described by the configuration.
pub fn connect(config: &DatastoreConfig) -> Result<Arc<dyn Datastore>, DatastoreError> {
    match config.backend {
        DatastoreBackend::Memory => {
            info!("Using in-memory datastore; data is lost on exit");
            Ok(Arc::new(MemoryDatastore::new()))
        }
        DatastoreBackend::Cloud => {
            let project_id = config.project_id.clone().ok_or_else(|| {
                DatastoreError::InvalidArgument(
                    "DATASTORE_PROJECT_ID is required for the cloud backend".to_string(),
                )
            })?;

            let http = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .map_err(|e| DatastoreError::Backend(format!("Failed to create HTTP client: {}", e)))?;

            let tokens = if config.emulator_host.is_some() {
                TokenSource::Anonymous
            } else {
                TokenSource::from_access_token(http.clone(), config.access_token.clone())
            };

            let endpoint = config.endpoint();
            info!("Using Cloud Datastore at {} (project {})", endpoint, project_id);
            Ok(Arc::new(CloudDatastore::new(http, endpoint, project_id, tokens)))
        }
    }
}
