pub mod activity;
pub mod error;
pub mod filters;
pub mod http;
pub mod listing;
pub mod products;
pub mod sellers;
pub mod stats;
pub mod store;
pub mod users;

pub use error::{AdminError, AdminResult};

use crate::store::{Fields, StoreError};
use serde_json::Value;

/// RFC 3339 timestamp written alongside every field change.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Field map for a single-field change plus its `updatedAt` stamp.
pub(crate) fn stamped(field: &str, value: Value, now: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert(field.to_string(), value);
    fields.insert("updatedAt".to_string(), Value::String(now.to_string()));
    fields
}

/// Map a store write failure for a single-entity action.
pub(crate) fn mutation_error(entity: &'static str, id: &str, e: StoreError) -> AdminError {
    match e {
        StoreError::NotFound(_) => AdminError::NotFound(format!("{} {}", entity, id)),
        source => {
            tracing::error!("Failed to update {} {}: {}", entity, id, source);
            AdminError::MutationFailed { entity, source }
        }
    }
}
