//! In-memory document store.
//!
//! Collections are `BTreeMap`s guarded by a single `tokio::sync::RwLock`, so a batch
//! commit is applied under one write lock and is atomic with respect to readers.
//! Not durable. Used by tests and local runs.
//!
//! Failure injection: `fail_collection` makes every read and write touching that
//! collection return `StoreError::Unavailable` until `heal_collection` is called.
use super::{Document, DocumentStore, Fields, Filter, Query, StoreError, StoreResult, Write};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

type Collection = BTreeMap<String, Fields>;

#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    failing: RwLock<HashSet<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_collection(&self, collection: &str) {
        self.failing.write().await.insert(collection.to_string());
    }

    pub async fn heal_collection(&self, collection: &str) {
        self.failing.write().await.remove(collection);
    }

    async fn check(&self, collection: &str) -> StoreResult<()> {
        if self.failing.read().await.contains(collection) {
            return Err(StoreError::Unavailable(format!(
                "collection {} is unavailable",
                collection
            )));
        }
        Ok(())
    }

    fn apply(collections: &mut HashMap<String, Collection>, write: Write) {
        match write {
            Write::Put {
                collection,
                id,
                fields,
            } => {
                collections.entry(collection).or_default().insert(id, fields);
            }
            Write::Update {
                collection, id, fields, ..
            } => {
                if let Some(existing) = collections
                    .get_mut(&collection)
                    .and_then(|c| c.get_mut(&id))
                {
                    existing.extend(fields);
                }
            }
            Write::Delete { collection, id } => {
                if let Some(c) = collections.get_mut(&collection) {
                    c.remove(&id);
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.check(collection).await?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.commit(vec![Write::Put {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        }])
        .await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.commit(vec![Write::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
            expect: None,
        }])
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.commit(vec![Write::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }])
        .await
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        self.check(&query.collection).await?;
        let collections = self.collections.read().await;
        let docs = collections
            .get(&query.collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, fields)| query.filters.iter().all(|f| f.matches(fields)))
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(query.finish(docs))
    }

    async fn count(&self, collection: &str, filters: &[Filter]) -> StoreResult<u64> {
        self.check(collection).await?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|c| {
                c.values()
                    .filter(|fields| filters.iter().all(|f| f.matches(fields)))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn commit(&self, writes: Vec<Write>) -> StoreResult<()> {
        for write in &writes {
            self.check(write.collection()).await?;
        }

        let mut collections = self.collections.write().await;
        // Validate the whole batch before touching anything.
        for write in &writes {
            if let Write::Update {
                collection,
                id,
                expect,
                ..
            } = write
            {
                let Some(existing) = collections.get(collection).and_then(|c| c.get(id)) else {
                    return Err(StoreError::NotFound(format!("{}/{}", collection, id)));
                };
                if let Some((field, value)) = expect {
                    if existing.get(field) != Some(value) {
                        return Err(StoreError::Conflict(format!(
                            "{}/{}: {} is no longer {}",
                            collection, id, field, value
                        )));
                    }
                }
            }
        }
        for write in writes {
            Self::apply(&mut collections, write);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
