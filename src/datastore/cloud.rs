//! Google Cloud Datastore backend over the v1 REST API.
//!
//! Also talks to the Datastore emulator, which serves the same API over
//! plain HTTP without authentication.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::credentials::TokenSource;

use super::error::DatastoreError;
use super::types::{Direction, Entity, Key, Mutation, Query, TransactionId, Value};
use super::Datastore;

pub const DEFAULT_ENDPOINT: &str = "https://datastore.googleapis.com";

#[derive(Debug, Clone)]
pub struct CloudDatastore {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    tokens: TokenSource,
}

impl CloudDatastore {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        project_id: impl Into<String>,
        tokens: TokenSource,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            tokens,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/v1/projects/{}:{}",
            self.endpoint, self.project_id, method
        )
    }

    async fn call<B, R>(&self, method: &str, body: &B) -> Result<R, DatastoreError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.method_url(method);
        let mut request = self.http.post(&url).json(body);
        if let Some(token) = self.tokens.token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| match e.error.status {
                    Some(s) => format!("{}: {}", s, e.error.message),
                    None => e.error.message,
                })
                .unwrap_or(text);
            error!("Datastore {} failed with {}: {}", method, status, message);
            return Err(DatastoreError::from_status(status, message));
        }

        debug!("Datastore {} -> {}", method, status);
        Ok(response.json::<R>().await?)
    }

    fn partition(&self) -> PartitionId {
        PartitionId {
            project_id: self.project_id.clone(),
        }
    }

    fn wire_key(&self, key: &Key) -> WireKey {
        WireKey {
            partition_id: Some(self.partition()),
            path: vec![PathElement {
                kind: key.kind.clone(),
                id: key.id.map(|id| id.to_string()),
            }],
        }
    }

    fn wire_entity(&self, entity: &Entity) -> WireEntity {
        WireEntity {
            key: Some(self.wire_key(&entity.key)),
            properties: entity
                .properties
                .iter()
                .map(|(name, value)| (name.clone(), WireValue::from(value)))
                .collect(),
        }
    }
}

#[async_trait]
impl Datastore for CloudDatastore {
    async fn lookup(
        &self,
        keys: &[Key],
        transaction: Option<&TransactionId>,
    ) -> Result<Vec<Option<Entity>>, DatastoreError> {
        let mut found: BTreeMap<Key, Entity> = BTreeMap::new();
        let mut pending: Vec<WireKey> = keys.iter().map(|k| self.wire_key(k)).collect();

        // The service may defer part of a batch; ask again for those keys.
        while !pending.is_empty() {
            let request = LookupRequest {
                read_options: transaction.map(|t| ReadOptions {
                    transaction: t.0.clone(),
                }),
                keys: pending,
            };
            let response: LookupResponse = self.call("lookup", &request).await?;
            for result in response.found {
                let entity = result.entity.into_entity()?;
                found.insert(entity.key.clone(), entity);
            }
            pending = response.deferred;
        }

        Ok(keys.iter().map(|k| found.remove(k)).collect())
    }

    async fn commit(
        &self,
        mutations: Vec<Mutation>,
        transaction: Option<&TransactionId>,
    ) -> Result<Vec<Key>, DatastoreError> {
        let request = CommitRequest {
            mode: if transaction.is_some() {
                "TRANSACTIONAL"
            } else {
                "NON_TRANSACTIONAL"
            },
            transaction: transaction.map(|t| t.0.clone()),
            mutations: mutations
                .iter()
                .map(|m| match m {
                    Mutation::Insert(e) => WireMutation::Insert(self.wire_entity(e)),
                    Mutation::Upsert(e) => WireMutation::Upsert(self.wire_entity(e)),
                    Mutation::Delete(k) => WireMutation::Delete(self.wire_key(k)),
                })
                .collect(),
        };
        let response: CommitResponse = self.call("commit", &request).await?;

        // Results only carry a key when the service allocated one.
        mutations
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let allocated = response
                    .mutation_results
                    .get(i)
                    .and_then(|r| r.key.as_ref());
                match allocated {
                    Some(key) => key.to_key(),
                    None => Ok(match m {
                        Mutation::Insert(e) | Mutation::Upsert(e) => e.key.clone(),
                        Mutation::Delete(k) => k.clone(),
                    }),
                }
            })
            .collect()
    }

    async fn run_query(&self, query: &Query) -> Result<Vec<Entity>, DatastoreError> {
        let mut entities = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let request = RunQueryRequest {
                partition_id: self.partition(),
                query: WireQuery {
                    kind: vec![KindExpression {
                        name: query.kind.clone(),
                    }],
                    order: query
                        .order
                        .iter()
                        .map(|(name, direction)| PropertyOrder {
                            property: PropertyReference { name: name.clone() },
                            direction: match direction {
                                Direction::Ascending => "ASCENDING",
                                Direction::Descending => "DESCENDING",
                            },
                        })
                        .collect(),
                    start_cursor: cursor.take(),
                },
            };
            let response: RunQueryResponse = self.call("runQuery", &request).await?;
            let batch = response.batch;
            for result in batch.entity_results {
                entities.push(result.entity.into_entity()?);
            }

            match (batch.more_results.as_str(), batch.end_cursor) {
                ("NOT_FINISHED", Some(end)) => cursor = Some(end),
                _ => break,
            }
        }

        Ok(entities)
    }

    async fn begin_transaction(&self) -> Result<TransactionId, DatastoreError> {
        let response: BeginTransactionResponse = self
            .call("beginTransaction", &serde_json::json!({}))
            .await?;
        Ok(TransactionId(response.transaction))
    }

    async fn rollback(&self, transaction: &TransactionId) -> Result<(), DatastoreError> {
        let _: serde_json::Value = self
            .call(
                "rollback",
                &serde_json::json!({ "transaction": transaction.0 }),
            )
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartitionId {
    project_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathElement {
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    partition_id: Option<PartitionId>,
    path: Vec<PathElement>,
}

impl WireKey {
    fn to_key(&self) -> Result<Key, DatastoreError> {
        let element = self
            .path
            .last()
            .ok_or_else(|| DatastoreError::Decode("key with empty path".to_string()))?;
        let id = match &element.id {
            Some(raw) => Some(raw.parse::<i64>().map_err(|e| {
                DatastoreError::Decode(format!("invalid key id '{}': {}", raw, e))
            })?),
            None => None,
        };
        Ok(Key {
            kind: element.kind.clone(),
            id,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    null_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    boolean_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    integer_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp_value: Option<String>,
}

impl From<&Value> for WireValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => WireValue {
                null_value: Some(serde_json::Value::Null),
                ..Default::default()
            },
            Value::Boolean(b) => WireValue {
                boolean_value: Some(*b),
                ..Default::default()
            },
            Value::Integer(i) => WireValue {
                integer_value: Some(i.to_string()),
                ..Default::default()
            },
            Value::String(s) => WireValue {
                string_value: Some(s.clone()),
                ..Default::default()
            },
            Value::Timestamp(t) => WireValue {
                timestamp_value: Some(t.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)),
                ..Default::default()
            },
        }
    }
}

impl WireValue {
    fn to_value(&self) -> Result<Value, DatastoreError> {
        if let Some(b) = self.boolean_value {
            return Ok(Value::Boolean(b));
        }
        if let Some(raw) = &self.integer_value {
            return raw
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| DatastoreError::Decode(format!("integer '{}': {}", raw, e)));
        }
        if let Some(s) = &self.string_value {
            return Ok(Value::String(s.clone()));
        }
        if let Some(raw) = &self.timestamp_value {
            return DateTime::parse_from_rfc3339(raw)
                .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
                .map_err(|e| DatastoreError::Decode(format!("timestamp '{}': {}", raw, e)));
        }
        Ok(Value::Null)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<WireKey>,
    #[serde(default)]
    properties: BTreeMap<String, WireValue>,
}

impl WireEntity {
    fn into_entity(self) -> Result<Entity, DatastoreError> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| DatastoreError::Decode("entity without key".to_string()))?
            .to_key()?;
        let mut entity = Entity::new(key);
        for (name, value) in &self.properties {
            entity.set(name, value.to_value()?);
        }
        Ok(entity)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadOptions {
    transaction: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    read_options: Option<ReadOptions>,
    keys: Vec<WireKey>,
}

#[derive(Debug, Deserialize)]
struct EntityResult {
    entity: WireEntity,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    found: Vec<EntityResult>,
    #[serde(default)]
    deferred: Vec<WireKey>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum WireMutation {
    Insert(WireEntity),
    Upsert(WireEntity),
    Delete(WireKey),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitRequest {
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    mutations: Vec<WireMutation>,
}

#[derive(Debug, Deserialize)]
struct MutationResult {
    #[serde(default)]
    key: Option<WireKey>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    #[serde(default)]
    mutation_results: Vec<MutationResult>,
}

#[derive(Debug, Serialize)]
struct KindExpression {
    name: String,
}

#[derive(Debug, Serialize)]
struct PropertyReference {
    name: String,
}

#[derive(Debug, Serialize)]
struct PropertyOrder {
    property: PropertyReference,
    direction: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireQuery {
    kind: Vec<KindExpression>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    order: Vec<PropertyOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryRequest {
    partition_id: PartitionId,
    query: WireQuery,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResultBatch {
    #[serde(default)]
    entity_results: Vec<EntityResult>,
    #[serde(default)]
    end_cursor: Option<String>,
    #[serde(default)]
    more_results: String,
}

#[derive(Debug, Deserialize)]
struct RunQueryResponse {
    batch: QueryResultBatch,
}

#[derive(Debug, Deserialize)]
struct BeginTransactionResponse {
    transaction: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}
