//! In-process datastore with the same optimistic transaction semantics as
//! the managed service. Used for local development and tests.

use async_trait::async_trait;
use log::debug;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::error::DatastoreError;
use super::types::{Direction, Entity, Key, Mutation, Query, TransactionId};
use super::Datastore;

/// Transactions left open longer than this are discarded when the next one
/// begins, as the managed service expires idle transactions.
pub const DEFAULT_TRANSACTION_TTL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct MemoryDatastore {
    state: Mutex<MemoryState>,
    transaction_ttl: Duration,
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            transaction_ttl: DEFAULT_TRANSACTION_TTL,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entities: BTreeMap<Key, Entity>,
    // Last commit version that touched each key. Entries for deleted keys
    // are kept only while an open transaction could still conflict on them.
    versions: HashMap<Key, u64>,
    transactions: HashMap<TransactionId, OpenTransaction>,
    last_id: i64,
    last_version: u64,
    last_transaction: u64,
}

#[derive(Debug)]
struct OpenTransaction {
    snapshot_version: u64,
    read_keys: HashSet<Key>,
    started: Instant,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transaction_ttl(mut self, ttl: Duration) -> Self {
        self.transaction_ttl = ttl;
        self
    }
}

impl MemoryState {
    fn version_of(&self, key: &Key) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    /// Drops transactions that were begun but never committed or rolled
    /// back, e.g. when the request driving them was cancelled.
    fn expire_transactions(&mut self, ttl: Duration, now: Instant) {
        let before = self.transactions.len();
        self.transactions
            .retain(|_, open| now.duration_since(open.started) < ttl);
        let expired = before - self.transactions.len();
        if expired > 0 {
            debug!("Expired {} abandoned transactions", expired);
        }
    }

    /// Forgets versions of deleted keys that no open transaction can see
    /// as changed.
    fn prune_tombstones(&mut self) {
        let horizon = self
            .transactions
            .values()
            .map(|open| open.snapshot_version)
            .min()
            .unwrap_or(self.last_version);
        let entities = &self.entities;
        self.versions
            .retain(|key, version| entities.contains_key(key) || *version > horizon);
    }

    fn validate(&self, mutations: &[Mutation]) -> Result<(), DatastoreError> {
        for mutation in mutations {
            match mutation {
                Mutation::Insert(entity) => {
                    if entity.key.is_complete() && self.entities.contains_key(&entity.key) {
                        return Err(DatastoreError::Conflict(format!(
                            "entity already exists: {}",
                            entity.key
                        )));
                    }
                }
                Mutation::Upsert(entity) => {
                    if !entity.key.is_complete() {
                        return Err(DatastoreError::InvalidArgument(format!(
                            "upsert requires a complete key: {}",
                            entity.key
                        )));
                    }
                }
                Mutation::Delete(key) => {
                    if !key.is_complete() {
                        return Err(DatastoreError::InvalidArgument(format!(
                            "delete requires a complete key: {}",
                            key
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, mutations: Vec<Mutation>) -> Result<Vec<Key>, DatastoreError> {
        self.validate(&mutations)?;
        self.last_version += 1;
        let version = self.last_version;

        let mut keys = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            match mutation {
                Mutation::Insert(mut entity) | Mutation::Upsert(mut entity) => {
                    if !entity.key.is_complete() {
                        self.last_id += 1;
                        entity.key.id = Some(self.last_id);
                    }
                    let key = entity.key.clone();
                    self.versions.insert(key.clone(), version);
                    self.entities.insert(key.clone(), entity);
                    keys.push(key);
                }
                Mutation::Delete(key) => {
                    self.versions.insert(key.clone(), version);
                    self.entities.remove(&key);
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}

fn mutation_key(mutation: &Mutation) -> &Key {
    match mutation {
        Mutation::Insert(entity) | Mutation::Upsert(entity) => &entity.key,
        Mutation::Delete(key) => key,
    }
}

fn compare_for_query(a: &Entity, b: &Entity, order: &[(String, Direction)]) -> Ordering {
    for (property, direction) in order {
        let ordering = match (a.get(property), b.get(property)) {
            (Some(x), Some(y)) => x.index_cmp(y),
            _ => Ordering::Equal,
        };
        let ordering = match direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.key.cmp(&b.key)
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn lookup(
        &self,
        keys: &[Key],
        transaction: Option<&TransactionId>,
    ) -> Result<Vec<Option<Entity>>, DatastoreError> {
        let mut state = self.state.lock().await;

        if let Some(id) = transaction {
            let open = state.transactions.get_mut(id).ok_or_else(|| {
                DatastoreError::InvalidArgument(format!("unknown transaction: {}", id.0))
            })?;
            open.read_keys.extend(keys.iter().cloned());
        }

        Ok(keys
            .iter()
            .map(|key| state.entities.get(key).cloned())
            .collect())
    }

    async fn commit(
        &self,
        mutations: Vec<Mutation>,
        transaction: Option<&TransactionId>,
    ) -> Result<Vec<Key>, DatastoreError> {
        let mut state = self.state.lock().await;

        if let Some(id) = transaction {
            let open = state.transactions.remove(id).ok_or_else(|| {
                DatastoreError::InvalidArgument(format!("unknown transaction: {}", id.0))
            })?;

            let touched = open
                .read_keys
                .iter()
                .chain(mutations.iter().map(mutation_key))
                .filter(|key| key.is_complete());
            for key in touched {
                if state.version_of(key) > open.snapshot_version {
                    debug!("Transaction {} conflicts on {}", id.0, key);
                    return Err(DatastoreError::Conflict(format!(
                        "{} was modified by a concurrent transaction",
                        key
                    )));
                }
            }
        }

        let keys = state.apply(mutations)?;
        state.prune_tombstones();
        Ok(keys)
    }

    async fn run_query(&self, query: &Query) -> Result<Vec<Entity>, DatastoreError> {
        let state = self.state.lock().await;

        // Entities missing an ordered property are not indexed for it.
        let mut results: Vec<Entity> = state
            .entities
            .values()
            .filter(|e| e.key.kind == query.kind)
            .filter(|e| query.order.iter().all(|(p, _)| e.get(p).is_some()))
            .cloned()
            .collect();
        results.sort_by(|a, b| compare_for_query(a, b, &query.order));
        Ok(results)
    }

    async fn begin_transaction(&self) -> Result<TransactionId, DatastoreError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.expire_transactions(self.transaction_ttl, now);
        state.last_transaction += 1;
        let id = TransactionId(format!("mem-tx-{}", state.last_transaction));
        let snapshot_version = state.last_version;
        state.transactions.insert(
            id.clone(),
            OpenTransaction {
                snapshot_version,
                read_keys: HashSet::new(),
                started: now,
            },
        );
        Ok(id)
    }

    async fn rollback(&self, transaction: &TransactionId) -> Result<(), DatastoreError> {
        let mut state = self.state.lock().await;
        state.transactions.remove(transaction).ok_or_else(|| {
            DatastoreError::InvalidArgument(format!("unknown transaction: {}", transaction.0))
        })?;
        state.prune_tombstones();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(description: &str) -> Entity {
        Entity::new(Key::incomplete("Task")).with("description", description)
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let store = MemoryDatastore::new();
        let keys = store
            .commit(
                vec![Mutation::Insert(task("a")), Mutation::Insert(task("b"))],
                None,
            )
            .await
            .unwrap();

        assert_eq!(keys[0], Key::with_id("Task", 1));
        assert_eq!(keys[1], Key::with_id("Task", 2));

        let found = store
            .lookup(&[Key::with_id("Task", 2), Key::with_id("Task", 9)], None)
            .await
            .unwrap();
        assert_eq!(found[0].as_ref().unwrap().string("description").unwrap(), "b");
        assert!(found[1].is_none());
    }

    #[tokio::test]
    async fn test_commit_is_atomic_on_invalid_mutation() {
        let store = MemoryDatastore::new();
        let result = store
            .commit(
                vec![
                    Mutation::Insert(task("kept out")),
                    Mutation::Delete(Key::incomplete("Task")),
                ],
                None,
            )
            .await;
        assert!(matches!(result, Err(DatastoreError::InvalidArgument(_))));
        assert!(store.run_query(&Query::new("Task")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = MemoryDatastore::new();
        store
            .commit(vec![Mutation::Delete(Key::with_id("Task", 99))], None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_query_filters_kind_and_orders() {
        let store = MemoryDatastore::new();
        store
            .commit(
                vec![
                    Mutation::Insert(task("z").with("rank", 3i64)),
                    Mutation::Insert(task("y").with("rank", 1i64)),
                    Mutation::Insert(Entity::new(Key::incomplete("Other")).with("rank", 2i64)),
                    Mutation::Insert(task("unranked")),
                ],
                None,
            )
            .await
            .unwrap();

        let ascending = store
            .run_query(&Query::new("Task").order("rank"))
            .await
            .unwrap();
        let names: Vec<&str> = ascending
            .iter()
            .map(|e| e.string("description").unwrap())
            .collect();
        assert_eq!(names, vec!["y", "z"]);

        let descending = store
            .run_query(&Query::new("Task").order("-rank"))
            .await
            .unwrap();
        assert_eq!(descending[0].string("description").unwrap(), "z");
    }

    #[tokio::test]
    async fn test_concurrent_transactions_conflict() {
        let store = MemoryDatastore::new();
        let keys = store
            .commit(vec![Mutation::Insert(task("shared"))], None)
            .await
            .unwrap();
        let key = keys[0].clone();

        let first = store.begin_transaction().await.unwrap();
        let second = store.begin_transaction().await.unwrap();
        store.lookup(&[key.clone()], Some(&first)).await.unwrap();
        store.lookup(&[key.clone()], Some(&second)).await.unwrap();

        let updated = Entity::new(key.clone()).with("description", "first wins");
        store
            .commit(vec![Mutation::Upsert(updated)], Some(&second))
            .await
            .unwrap();

        let stale = Entity::new(key.clone()).with("description", "lost update");
        let result = store.commit(vec![Mutation::Upsert(stale)], Some(&first)).await;
        assert!(matches!(result, Err(DatastoreError::Conflict(_))));

        let current = store.lookup(&[key], None).await.unwrap();
        assert_eq!(
            current[0].as_ref().unwrap().string("description").unwrap(),
            "first wins"
        );
    }

    #[tokio::test]
    async fn test_abandoned_transaction_expires() {
        let store = MemoryDatastore::new().with_transaction_ttl(Duration::ZERO);
        let abandoned = store.begin_transaction().await.unwrap();
        let current = store.begin_transaction().await.unwrap();

        assert_eq!(store.state.lock().await.transactions.len(), 1);
        assert!(matches!(
            store.commit(Vec::new(), Some(&abandoned)).await,
            Err(DatastoreError::InvalidArgument(_))
        ));
        store.commit(Vec::new(), Some(&current)).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_transactions_survive_within_ttl() {
        let store = MemoryDatastore::new();
        let first = store.begin_transaction().await.unwrap();
        let _second = store.begin_transaction().await.unwrap();
        assert_eq!(store.state.lock().await.transactions.len(), 2);
        store.commit(Vec::new(), Some(&first)).await.unwrap();
    }

    #[tokio::test]
    async fn test_deleted_key_version_kept_while_visible() {
        let store = MemoryDatastore::new();
        let key = store
            .commit(vec![Mutation::Insert(task("short lived"))], None)
            .await
            .unwrap()
            .remove(0);

        let reader = store.begin_transaction().await.unwrap();
        store.lookup(&[key.clone()], Some(&reader)).await.unwrap();
        store
            .commit(vec![Mutation::Delete(key.clone())], None)
            .await
            .unwrap();
        assert!(store.state.lock().await.versions.contains_key(&key));

        // The reader saw the entity before the delete and must not resurrect it.
        let result = store
            .commit(
                vec![Mutation::Upsert(Entity::new(key.clone()).with("description", "back"))],
                Some(&reader),
            )
            .await;
        assert!(matches!(result, Err(DatastoreError::Conflict(_))));

        store
            .commit(vec![Mutation::Insert(task("unrelated"))], None)
            .await
            .unwrap();
        assert!(!store.state.lock().await.versions.contains_key(&key));
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let store = MemoryDatastore::new();
        let bogus = TransactionId("nope".to_string());
        assert!(matches!(
            store.rollback(&bogus).await,
            Err(DatastoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.commit(Vec::new(), Some(&bogus)).await,
            Err(DatastoreError::InvalidArgument(_))
        ));
    }
}
