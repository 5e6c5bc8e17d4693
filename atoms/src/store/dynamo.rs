use super::{
    Document, DocumentStore, Fields, Filter, Query, StoreError, StoreResult, Write,
};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeValue, ConditionCheck, Delete, Put, Select, TransactWriteItem, Update,
};
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::{Number, Value};
use std::collections::HashMap;

/// DynamoDB transactions accept at most this many items.
const MAX_TRANSACT_ITEMS: usize = 100;

/// Single-table DynamoDB store:
/// PK = "{COLLECTION}"
/// SK = "{COLLECTION}#{id}"
/// Document fields are stored as top-level attributes next to the keys.
pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    fn key(collection: &str, id: &str) -> HashMap<String, AttributeValue> {
        let pk = partition_key(collection);
        let sk = format!("{}#{}", pk, id);
        HashMap::from([
            ("PK".to_string(), AttributeValue::S(pk)),
            ("SK".to_string(), AttributeValue::S(sk)),
        ])
    }

    fn item(collection: &str, id: &str, fields: &Fields) -> HashMap<String, AttributeValue> {
        let mut item = Self::key(collection, id);
        for (name, value) in fields {
            item.insert(name.clone(), to_attribute(value));
        }
        item
    }

    /// Runs a paginated partition query and returns every matching item.
    async fn query_partition(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> StoreResult<Vec<Document>> {
        let pk = partition_key(collection);
        let prefix = format!("{}#", pk);
        let filter = FilterExpression::build(filters);

        let mut documents = Vec::new();
        let mut start_key = None;
        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
                .expression_attribute_values(":pk", AttributeValue::S(pk.clone()))
                .expression_attribute_values(":sk_prefix", AttributeValue::S(prefix.clone()))
                .set_exclusive_start_key(start_key);
            if let Some(filter) = &filter {
                request = request.filter_expression(&filter.expression);
                for (k, v) in &filter.names {
                    request = request.expression_attribute_names(k, v);
                }
                for (k, v) in &filter.values {
                    request = request.expression_attribute_values(k, v.clone());
                }
            }

            let result = request.send().await.map_err(|e| {
                tracing::error!("DynamoDB query failed for {}: {:?}", collection, e);
                StoreError::Unavailable(format!("DynamoDB query error: {}", e))
            })?;

            for item in result.items() {
                if let Some(doc) = from_item(&prefix, item) {
                    documents.push(doc);
                }
            }

            match result.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(documents)
    }

    fn transact_item(&self, write: &Write) -> StoreResult<TransactWriteItem> {
        let built = match write {
            Write::Put {
                collection,
                id,
                fields,
            } => Put::builder()
                .table_name(&self.table_name)
                .set_item(Some(Self::item(collection, id, fields)))
                .build()
                .map(|put| TransactWriteItem::builder().put(put).build()),
            Write::Update {
                collection,
                id,
                fields,
                expect,
            } => {
                let condition = Condition::build(expect.as_ref());
                match SetExpression::build(fields) {
                    Some(set) => {
                        let (names, values) = condition.merge(set.names, set.values);
                        Update::builder()
                            .table_name(&self.table_name)
                            .set_key(Some(Self::key(collection, id)))
                            .update_expression(set.expression)
                            .set_expression_attribute_names(names)
                            .set_expression_attribute_values(values)
                            .condition_expression(condition.expression)
                            .build()
                            .map(|update| TransactWriteItem::builder().update(update).build())
                    }
                    // Nothing to set: only the existence and expectation checks remain.
                    None => {
                        let (names, values) = condition.merge(HashMap::new(), HashMap::new());
                        ConditionCheck::builder()
                            .table_name(&self.table_name)
                            .set_key(Some(Self::key(collection, id)))
                            .set_expression_attribute_names(names)
                            .set_expression_attribute_values(values)
                            .condition_expression(condition.expression)
                            .build()
                            .map(|check| TransactWriteItem::builder().condition_check(check).build())
                    }
                }
            }
            Write::Delete { collection, id } => Delete::builder()
                .table_name(&self.table_name)
                .set_key(Some(Self::key(collection, id)))
                .build()
                .map(|delete| TransactWriteItem::builder().delete(delete).build()),
        };
        built.map_err(|e| StoreError::Backend(format!("invalid transaction item: {}", e)))
    }
}

#[async_trait]
impl DocumentStore for DynamoStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key(collection, id)))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("DynamoDB get_item error: {}", e)))?;

        Ok(result.item().map(|item| Document::new(id, to_fields(item))))
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(Self::item(collection, id, &fields)))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("DynamoDB put_item error: {}", e)))?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key(collection, id)))
            .condition_expression("attribute_exists(PK)");
        // An empty update still fails on a missing document.
        if let Some(set) = SetExpression::build(&fields) {
            request = request
                .update_expression(set.expression)
                .set_expression_attribute_names(Some(set.names))
                .set_expression_attribute_values(Some(set.values));
        }
        let result = request.send().await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    Err(StoreError::NotFound(format!("{}/{}", collection, id)))
                } else {
                    Err(StoreError::Unavailable(format!(
                        "DynamoDB update_item error: {}",
                        service_error
                    )))
                }
            }
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key(collection, id)))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("DynamoDB delete_item error: {}", e)))?;
        Ok(())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        // Arbitrary ordering keys have no index, so ordering and the cursor are
        // applied after the partition has been read.
        let documents = self.query_partition(&query.collection, &query.filters).await?;
        Ok(query.finish(documents))
    }

    async fn count(&self, collection: &str, filters: &[Filter]) -> StoreResult<u64> {
        let pk = partition_key(collection);
        let prefix = format!("{}#", pk);
        let filter = FilterExpression::build(filters);

        let mut total = 0u64;
        let mut start_key = None;
        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table_name)
                .select(Select::Count)
                .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
                .expression_attribute_values(":pk", AttributeValue::S(pk.clone()))
                .expression_attribute_values(":sk_prefix", AttributeValue::S(prefix.clone()))
                .set_exclusive_start_key(start_key);
            if let Some(filter) = &filter {
                request = request.filter_expression(&filter.expression);
                for (k, v) in &filter.names {
                    request = request.expression_attribute_names(k, v);
                }
                for (k, v) in &filter.values {
                    request = request.expression_attribute_values(k, v.clone());
                }
            }

            let result = request.send().await.map_err(|e| {
                tracing::error!("DynamoDB count failed for {}: {:?}", collection, e);
                StoreError::Unavailable(format!("DynamoDB query error: {}", e))
            })?;
            total += result.count().max(0) as u64;

            match result.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(total)
    }

    async fn commit(&self, writes: Vec<Write>) -> StoreResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        if writes.len() > MAX_TRANSACT_ITEMS {
            return Err(StoreError::Backend(format!(
                "batch of {} writes exceeds the transaction limit of {}",
                writes.len(),
                MAX_TRANSACT_ITEMS
            )));
        }

        let items = writes
            .iter()
            .map(|w| self.transact_item(w))
            .collect::<StoreResult<Vec<_>>>()?;

        let result = self
            .client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_transaction_canceled_exception() {
                    // A failed existence or expectation check is the usual cause.
                    Err(StoreError::Conflict(format!(
                        "DynamoDB transaction cancelled: {}",
                        service_error
                    )))
                } else {
                    Err(StoreError::Unavailable(format!(
                        "DynamoDB transact_write_items error: {}",
                        service_error
                    )))
                }
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "dynamodb"
    }
}

fn partition_key(collection: &str) -> String {
    collection.to_uppercase()
}

fn from_item(prefix: &str, item: &HashMap<String, AttributeValue>) -> Option<Document> {
    let sk = item.get("SK").and_then(|v| v.as_s().ok())?;
    let id = sk.strip_prefix(prefix)?;
    Some(Document::new(id, to_fields(item)))
}

fn to_fields(item: &HashMap<String, AttributeValue>) -> Fields {
    item.iter()
        .filter(|(name, _)| name.as_str() != "PK" && name.as_str() != "SK")
        .map(|(name, value)| (name.clone(), from_attribute(value)))
        .collect()
}

pub(crate) fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

pub(crate) fn from_attribute(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::L(items) => Value::Array(items.iter().map(from_attribute).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_attribute(v)))
                .collect(),
        ),
        AttributeValue::Ss(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(items) => Value::Array(items.iter().map(|n| parse_number(n)).collect()),
        _ => Value::Null,
    }
}

fn parse_number(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::Number(i.into());
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

struct SetExpression {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl SetExpression {
    fn build(fields: &Fields) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }
        let mut parts = vec![];
        let mut names = HashMap::new();
        let mut values = HashMap::new();
        for (i, (name, value)) in fields.iter().enumerate() {
            parts.push(format!("#f{i} = :v{i}"));
            names.insert(format!("#f{i}"), name.clone());
            values.insert(format!(":v{i}"), to_attribute(value));
        }
        Some(Self {
            expression: format!("SET {}", parts.join(", ")),
            names,
            values,
        })
    }
}

type Placeholders = (
    Option<HashMap<String, String>>,
    Option<HashMap<String, AttributeValue>>,
);

/// Condition on a transactional update: the item exists and, optionally, one
/// field still holds the expected value.
struct Condition {
    expression: String,
    expected: Option<(String, AttributeValue)>,
}

impl Condition {
    fn build(expect: Option<&(String, Value)>) -> Self {
        match expect {
            None => Self {
                expression: "attribute_exists(PK)".to_string(),
                expected: None,
            },
            Some((field, value)) => Self {
                expression: "attribute_exists(PK) AND #expect = :expect".to_string(),
                expected: Some((field.clone(), to_attribute(value))),
            },
        }
    }

    /// Adds the condition placeholders. DynamoDB refuses empty placeholder maps,
    /// so those come back as `None`.
    fn merge(
        &self,
        mut names: HashMap<String, String>,
        mut values: HashMap<String, AttributeValue>,
    ) -> Placeholders {
        if let Some((field, value)) = &self.expected {
            names.insert("#expect".to_string(), field.clone());
            values.insert(":expect".to_string(), value.clone());
        }
        (
            (!names.is_empty()).then_some(names),
            (!values.is_empty()).then_some(values),
        )
    }
}

struct FilterExpression {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl FilterExpression {
    fn build(filters: &[Filter]) -> Option<Self> {
        if filters.is_empty() {
            return None;
        }
        let mut parts = vec![];
        let mut names = HashMap::new();
        let mut values = HashMap::new();
        for (i, filter) in filters.iter().enumerate() {
            let (field, value, clause) = match filter {
                Filter::Eq(f, v) => (f, v, format!("#q{i} = :q{i}")),
                Filter::Lte(f, v) => (f, v, format!("#q{i} <= :q{i}")),
                Filter::Gte(f, v) => (f, v, format!("#q{i} >= :q{i}")),
                Filter::Contains(f, v) => (f, v, format!("contains(#q{i}, :q{i})")),
            };
            parts.push(clause);
            names.insert(format!("#q{i}"), field.clone());
            values.insert(format!(":q{i}"), to_attribute(value));
        }
        Some(Self {
            expression: parts.join(" AND "),
            names,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attribute_conversion_keeps_nested_shapes() {
        let value = json!({
            "roles": ["user", "seller"],
            "currentStock": 12,
            "price": 19.5,
            "isActive": true,
            "address": {"city": "Cebu"},
            "salePrice": null
        });
        assert_eq!(from_attribute(&to_attribute(&value)), value);
    }

    #[test]
    fn filter_expression_uses_placeholders() {
        let filter = FilterExpression::build(&[
            Filter::eq("status", "pending"),
            Filter::contains("roles", "seller"),
        ])
        .unwrap();
        assert_eq!(filter.expression, "#q0 = :q0 AND contains(#q1, :q1)");
        assert_eq!(filter.names.get("#q1").map(String::as_str), Some("roles"));
    }

    #[test]
    fn expectation_joins_existence_check() {
        let expect = ("status".to_string(), json!("pending"));
        let condition = Condition::build(Some(&expect));
        assert_eq!(condition.expression, "attribute_exists(PK) AND #expect = :expect");

        let set = SetExpression::build(&json!({"status": "approved"}).as_object().cloned().unwrap())
            .unwrap();
        let (names, values) = condition.merge(set.names, set.values);
        let names = names.unwrap();
        assert_eq!(names.get("#expect").map(String::as_str), Some("status"));
        assert_eq!(names.get("#f0").map(String::as_str), Some("status"));
        assert_eq!(
            values.unwrap().get(":expect").and_then(|v| v.as_s().ok()).map(String::as_str),
            Some("pending")
        );
    }

    #[test]
    fn empty_update_keeps_only_the_existence_check() {
        assert!(SetExpression::build(&Fields::new()).is_none());
        let condition = Condition::build(None);
        assert_eq!(condition.expression, "attribute_exists(PK)");
        assert_eq!(condition.merge(HashMap::new(), HashMap::new()), (None, None));
    }

    #[test]
    fn keys_follow_single_table_layout() {
        let key = DynamoStore::key("sellers", "app1");
        assert_eq!(key.get("PK").and_then(|v| v.as_s().ok()).map(String::as_str), Some("SELLERS"));
        assert_eq!(
            key.get("SK").and_then(|v| v.as_s().ok()).map(String::as_str),
            Some("SELLERS#app1")
        );
    }
}
