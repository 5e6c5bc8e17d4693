use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;

pub mod dynamo;
pub mod memory;

pub use dynamo::DynamoStore;
pub use memory::InMemoryStore;

/// Field map of a stored document (everything except its id).
pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: &'static str,
    pub direction: Direction,
}

impl OrderBy {
    pub const fn asc(field: &'static str) -> Self {
        Self {
            field,
            direction: Direction::Asc,
        }
    }

    pub const fn desc(field: &'static str) -> Self {
        Self {
            field,
            direction: Direction::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Lte(String, Value),
    Gte(String, Value),
    /// Array field contains the value.
    Contains(String, Value),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Lte(field.to_string(), value.into())
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Gte(field.to_string(), value.into())
    }

    pub fn contains(field: &str, value: impl Into<Value>) -> Self {
        Filter::Contains(field.to_string(), value.into())
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Filter::Eq(field, value) => fields.get(field) == Some(value),
            Filter::Lte(field, value) => fields
                .get(field)
                .and_then(|v| compare_values(v, value))
                .is_some_and(|o| o != Ordering::Greater),
            Filter::Gte(field, value) => fields
                .get(field)
                .and_then(|v| compare_values(v, value))
                .is_some_and(|o| o != Ordering::Less),
            Filter::Contains(field, value) => fields
                .get(field)
                .and_then(|v| v.as_array())
                .is_some_and(|items| items.contains(value)),
        }
    }
}

/// A collection query: predicates, one ordering key, a limit and a start-after cursor.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    /// Document to resume after, located by its ordering value and id. It does not
    /// have to match the filters any more.
    pub start_after: Option<Document>,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Self {
            collection: name.to_string(),
            ..Default::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, cursor: Option<Document>) -> Self {
        self.start_after = cursor;
        self
    }

    /// Total order used for paging: the ordering field (missing values last in
    /// either direction), then the id.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let Some(order) = &self.order_by else {
            return a.id.cmp(&b.id);
        };
        let ord = match (a.get(order.field), b.get(order.field)) {
            (Some(x), Some(y)) => {
                let ord = compare_values(x, y).unwrap_or(Ordering::Equal);
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        ord.then_with(|| a.id.cmp(&b.id))
    }

    /// Orders, resumes and truncates an already filtered result set.
    ///
    /// Both backends evaluate predicates first and then call this, so paging
    /// semantics are identical between them.
    pub fn finish(&self, mut docs: Vec<Document>) -> Vec<Document> {
        docs.sort_by(|a, b| self.compare(a, b));

        let start = match &self.start_after {
            Some(cursor) => docs.partition_point(|d| self.compare(d, cursor) != Ordering::Greater),
            None => 0,
        };

        let iter = docs.into_iter().skip(start);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// A single write inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Put {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Merge into an existing document. With `expect`, the named field must
    /// still hold that value at commit time or the whole batch is refused.
    Update {
        collection: String,
        id: String,
        fields: Fields,
        expect: Option<(String, Value)>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl Write {
    pub fn collection(&self) -> &str {
        match self {
            Write::Put { collection, .. }
            | Write::Update { collection, .. }
            | Write::Delete { collection, .. } => collection,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;
    /// Insert or overwrite the whole document.
    async fn put(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;
    /// Merge fields into an existing document.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;
    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>>;
    async fn count(&self, collection: &str, filters: &[Filter]) -> StoreResult<u64>;
    /// Apply every write or none of them.
    async fn commit(&self, writes: Vec<Write>) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}

/// Compares two JSON scalars of the same kind. Mixed kinds are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: Value) -> Document {
        Document::new(id, value.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn finish_orders_and_breaks_ties_by_id() {
        let query = Query::collection("users").order_by(OrderBy::asc("email"));
        let docs = vec![
            doc("b", json!({"email": "same@x.io"})),
            doc("a", json!({"email": "same@x.io"})),
            doc("c", json!({"email": "alpha@x.io"})),
            doc("d", json!({})),
        ];
        let ids: Vec<_> = query.finish(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn missing_values_sort_last_in_both_directions() {
        let docs = vec![
            doc("undated", json!({})),
            doc("old", json!({"createdAt": "2024-01-01"})),
            doc("new", json!({"createdAt": "2024-06-01"})),
        ];
        let desc = Query::collection("products").order_by(OrderBy::desc("createdAt"));
        let ids: Vec<_> = desc.finish(docs.clone()).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["new", "old", "undated"]);

        let asc = Query::collection("products").order_by(OrderBy::asc("createdAt"));
        let ids: Vec<_> = asc.finish(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["old", "new", "undated"]);
    }

    #[test]
    fn cursor_resumes_by_sort_key_when_it_left_the_result_set() {
        // "b" no longer matches the filters, so only its sort key is known.
        let cursor = doc("b", json!({"submittedAt": "2024-01-04", "status": "approved"}));
        let query = Query::collection("sellers")
            .order_by(OrderBy::desc("submittedAt"))
            .limit(2)
            .start_after(Some(cursor));
        let docs = vec![
            doc("a", json!({"submittedAt": "2024-01-05"})),
            doc("c", json!({"submittedAt": "2024-01-03"})),
            doc("d", json!({"submittedAt": "2024-01-02"})),
            doc("e", json!({"submittedAt": "2024-01-01"})),
        ];
        let ids: Vec<_> = query.finish(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[test]
    fn range_and_contains_filters() {
        let fields = json!({"currentStock": 3, "roles": ["user", "seller"]})
            .as_object()
            .cloned()
            .unwrap();
        assert!(Filter::lte("currentStock", 5).matches(&fields));
        assert!(!Filter::gte("currentStock", 5).matches(&fields));
        assert!(Filter::contains("roles", "seller").matches(&fields));
        assert!(!Filter::contains("roles", "admin").matches(&fields));
        assert!(!Filter::eq("missing", 1).matches(&fields));
    }
}
