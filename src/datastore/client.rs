//! Convenience layer over a [`Datastore`] backend: single-entity calls and a
//! retrying transaction runner.

use futures::future::BoxFuture;
use log::{debug, warn};
use std::sync::Arc;

use super::error::DatastoreError;
use super::types::{Entity, Key, Mutation, Query, TransactionId};
use super::Datastore;

pub const DEFAULT_TRANSACTION_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct Client {
    store: Arc<dyn Datastore>,
    max_attempts: usize,
}

impl Client {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_TRANSACTION_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Fetches one entity. A missing entity is `NotFound`.
    pub async fn get(&self, key: &Key) -> Result<Entity, DatastoreError> {
        lookup_one(self.store.as_ref(), key, None).await
    }

    /// Stores an entity, inserting when its key is incomplete. Returns the
    /// complete key.
    pub async fn put(&self, entity: Entity) -> Result<Key, DatastoreError> {
        let mut keys = self.store.commit(vec![put_mutation(entity)], None).await?;
        keys.pop()
            .ok_or_else(|| DatastoreError::Backend("commit returned no key".to_string()))
    }

    pub async fn delete(&self, key: &Key) -> Result<(), DatastoreError> {
        self.store
            .commit(vec![Mutation::Delete(key.clone())], None)
            .await?;
        Ok(())
    }

    pub async fn get_all(&self, query: &Query) -> Result<Vec<Entity>, DatastoreError> {
        self.store.run_query(query).await
    }

    /// Runs `f` inside a transaction and commits the mutations it buffered.
    ///
    /// A commit that loses to a concurrent transaction is retried with a fresh
    /// transaction, up to the configured number of attempts. Any other error,
    /// from `f` or from the commit, is returned after rolling back.
    pub async fn run_in_transaction<F, T>(&self, mut f: F) -> Result<T, DatastoreError>
    where
        F: for<'t> FnMut(&'t mut Transaction) -> BoxFuture<'t, Result<T, DatastoreError>> + Send,
        T: Send,
    {
        for attempt in 1..=self.max_attempts {
            let id = self.store.begin_transaction().await?;
            let mut tx = Transaction {
                store: Arc::clone(&self.store),
                id,
                mutations: Vec::new(),
            };

            let value = match f(&mut tx).await {
                Ok(value) => value,
                Err(e) => {
                    if let Err(rollback_err) = self.store.rollback(&tx.id).await {
                        warn!("Rollback of {} failed: {}", tx.id.0, rollback_err);
                    }
                    if e.is_conflict() && attempt < self.max_attempts {
                        continue;
                    }
                    return Err(e);
                }
            };

            let mutations = std::mem::take(&mut tx.mutations);
            match self.store.commit(mutations, Some(&tx.id)).await {
                Ok(_) => {
                    debug!("Transaction {} committed on attempt {}", tx.id.0, attempt);
                    return Ok(value);
                }
                Err(e) if e.is_conflict() => {
                    warn!(
                        "Transaction conflict (attempt {}/{}): {}",
                        attempt, self.max_attempts, e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(DatastoreError::Conflict(format!(
            "transaction aborted after {} attempts",
            self.max_attempts
        )))
    }
}

/// An open transaction. Reads go to the backend immediately; writes are
/// buffered and sent on commit.
pub struct Transaction {
    store: Arc<dyn Datastore>,
    id: TransactionId,
    mutations: Vec<Mutation>,
}

impl Transaction {
    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub async fn get(&self, key: &Key) -> Result<Entity, DatastoreError> {
        lookup_one(self.store.as_ref(), key, Some(&self.id)).await
    }

    pub fn put(&mut self, entity: Entity) {
        self.mutations.push(put_mutation(entity));
    }

    pub fn delete(&mut self, key: Key) {
        self.mutations.push(Mutation::Delete(key));
    }
}

fn put_mutation(entity: Entity) -> Mutation {
    if entity.key.is_complete() {
        Mutation::Upsert(entity)
    } else {
        Mutation::Insert(entity)
    }
}

async fn lookup_one(
    store: &dyn Datastore,
    key: &Key,
    transaction: Option<&TransactionId>,
) -> Result<Entity, DatastoreError> {
    store
        .lookup(std::slice::from_ref(key), transaction)
        .await?
        .pop()
        .flatten()
        .ok_or_else(|| DatastoreError::NotFound(key.to_string()))
}
