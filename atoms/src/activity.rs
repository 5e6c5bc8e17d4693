use crate::error::{AdminError, AdminResult};
use crate::store::{DocumentStore, Fields, OrderBy, Query, Write};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const COLLECTION: &str = "activity_logs";
pub const RECENT_ACTIVITY_LIMIT: usize = 10;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ActivityLog {
    pub fn new(kind: &str, description: String, timestamp: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            description,
            user_id: None,
            application_id: None,
            timestamp: Some(timestamp.to_string()),
        }
    }

    /// The log entry as a batch write, so it commits with the change it describes.
    pub fn into_write(self) -> Write {
        let mut fields = match serde_json::to_value(&self) {
            Ok(Value::Object(map)) => map,
            _ => Fields::new(),
        };
        fields.remove("id");
        Write::Put {
            collection: COLLECTION.to_string(),
            id: self.id,
            fields,
        }
    }
}

/// Most recent entries first.
pub async fn recent_activity(
    store: &dyn DocumentStore,
    limit: usize,
) -> AdminResult<Vec<ActivityLog>> {
    let query = Query::collection(COLLECTION)
        .order_by(OrderBy::desc("timestamp"))
        .limit(limit);
    let docs = store
        .query(&query)
        .await
        .map_err(|source| AdminError::QueryFailed {
            entity: "activity",
            source,
        })?;

    Ok(docs
        .into_iter()
        .filter_map(|doc| {
            let mut log: ActivityLog = serde_json::from_value(Value::Object(doc.fields)).ok()?;
            log.id = doc.id;
            Some(log)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn recent_activity_is_newest_first_and_bounded() {
        let store = InMemoryStore::new();
        let writes = (0..12)
            .map(|i| {
                ActivityLog::new(
                    "note",
                    format!("entry {i}"),
                    &format!("2024-05-01T10:00:{i:02}+00:00"),
                )
                .into_write()
            })
            .collect();
        store.commit(writes).await.unwrap();

        let logs = recent_activity(&store, RECENT_ACTIVITY_LIMIT).await.unwrap();
        assert_eq!(logs.len(), 10);
        assert_eq!(logs[0].description, "entry 11");
        assert!(!logs[0].id.is_empty());
    }
}
