//! Cursor-paginated listing over one collection.
//!
//! A page query and a full-collection count run side by side on every call. The two
//! reads are independent, so under concurrent writes `total_count` can briefly disagree
//! with `items`. That is accepted; the store offers no snapshot reads.
use crate::error::{AdminError, AdminResult};
use crate::filters::{apply_filters, EntityFilter};
use crate::store::{Document, DocumentStore, Filter, OrderBy, Query};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Users,
    Products,
    SellerApplications,
}

impl EntityKind {
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Users => "users",
            EntityKind::Products => "products",
            EntityKind::SellerApplications => "sellers",
        }
    }

    /// Fixed ordering key per kind.
    pub fn default_order(&self) -> OrderBy {
        match self {
            EntityKind::Users => OrderBy::asc("email"),
            EntityKind::Products => OrderBy::desc("createdAt"),
            EntityKind::SellerApplications => OrderBy::desc("submittedAt"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Users => "users",
            EntityKind::Products => "products",
            EntityKind::SellerApplications => "seller applications",
        }
    }
}

/// A record that can be listed and patched by id.
pub trait Entity: DeserializeOwned + Clone + Send + Sync {
    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);

    fn from_document(doc: Document) -> Result<Self, serde_json::Error> {
        let mut entity: Self = serde_json::from_value(Value::Object(doc.fields))?;
        entity.set_id(doc.id);
        Ok(entity)
    }
}

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub page_size: usize,
    pub after: Option<String>,
    /// Store-side predicates, applied to both the page and the count.
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
}

impl PageRequest {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            after: None,
            filters: vec![],
            order: None,
        }
    }

    pub fn after(mut self, cursor: Option<String>) -> Self {
        self.after = cursor;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub total_count: u64,
}

pub fn validate_page_size(page_size: usize) -> AdminResult<()> {
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(AdminError::InvalidRequest(format!(
            "page size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    Ok(())
}

/// Fetch one page of `T` in its kind's order, resuming after `request.after`.
pub async fn list_page<T: Entity>(
    store: &dyn DocumentStore,
    request: &PageRequest,
) -> AdminResult<Page<T>> {
    validate_page_size(request.page_size)?;
    let kind = T::KIND;
    let collection = kind.collection();
    let query_failed = |source| AdminError::QueryFailed {
        entity: kind.label(),
        source,
    };

    // Resume by the cursor document's position in the ordering, even if it no
    // longer matches the filters.
    let mut cursor = None;
    if let Some(after) = &request.after {
        cursor = store.get(collection, after).await.map_err(query_failed)?;
        if cursor.is_none() {
            tracing::warn!(
                "Cursor {} no longer exists in {}, falling back to first page",
                after,
                collection
            );
        }
    }

    let mut query = Query::collection(collection)
        .order_by(request.order.clone().unwrap_or_else(|| kind.default_order()))
        .limit(request.page_size)
        .start_after(cursor);
    query.filters = request.filters.clone();

    let (docs, total) = tokio::join!(
        store.query(&query),
        store.count(collection, &request.filters)
    );
    let docs = docs.map_err(|e| {
        tracing::error!("Failed to query {}: {}", collection, e);
        query_failed(e)
    })?;
    let total_count = total.map_err(|e| {
        tracing::error!("Failed to count {}: {}", collection, e);
        query_failed(e)
    })?;

    let full_page = docs.len() == request.page_size;
    let last_id = docs.last().map(|d| d.id.clone());
    let items = decode_documents(docs);

    Ok(Page {
        items,
        next_cursor: if full_page { last_id } else { None },
        total_count,
    })
}

/// Decode documents, skipping the ones that do not fit the model.
pub fn decode_documents<T: Entity>(docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match T::from_document(doc) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    tracing::warn!(
                        "Skipping malformed {} document {}: {}",
                        T::KIND.collection(),
                        id,
                        e
                    );
                    None
                }
            }
        })
        .collect()
}

/// The loaded page of a listing view, owned by one admin session.
///
/// Failed loads leave the current page untouched so the caller can retry.
#[derive(Debug, Clone)]
pub struct ListingSession<T: Entity> {
    page_size: usize,
    filters: Vec<Filter>,
    items: Vec<T>,
    page_number: usize,
    total_count: u64,
    next_cursor: Option<String>,
}

impl<T: Entity> ListingSession<T> {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            filters: vec![],
            items: vec![],
            page_number: 0,
            total_count: 0,
            next_cursor: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn has_next(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub async fn load_first(&mut self, store: &dyn DocumentStore) -> AdminResult<()> {
        let page = self.fetch(store, None).await?;
        self.install(page, 1);
        Ok(())
    }

    /// Returns `false` when there is no further page.
    pub async fn load_next(&mut self, store: &dyn DocumentStore) -> AdminResult<bool> {
        let Some(cursor) = self.next_cursor.clone() else {
            return Ok(false);
        };
        let page = self.fetch(store, Some(cursor)).await?;
        let number = self.page_number + 1;
        self.install(page, number);
        Ok(true)
    }

    /// Cursors only run forward, so earlier pages are re-walked from the start.
    pub async fn load_previous(&mut self, store: &dyn DocumentStore) -> AdminResult<bool> {
        if self.page_number <= 1 {
            return Ok(false);
        }
        self.load_page(store, self.page_number - 1).await?;
        Ok(true)
    }

    pub async fn refresh(&mut self, store: &dyn DocumentStore) -> AdminResult<()> {
        self.load_page(store, self.page_number.max(1)).await
    }

    async fn load_page(&mut self, store: &dyn DocumentStore, number: usize) -> AdminResult<()> {
        let mut page = self.fetch(store, None).await?;
        let mut reached = 1;
        while reached < number {
            let Some(cursor) = page.next_cursor.clone() else {
                break;
            };
            page = self.fetch(store, Some(cursor)).await?;
            reached += 1;
        }
        self.install(page, reached);
        Ok(())
    }

    async fn fetch(
        &self,
        store: &dyn DocumentStore,
        after: Option<String>,
    ) -> AdminResult<Page<T>> {
        let mut request = PageRequest::new(self.page_size).after(after);
        request.filters = self.filters.clone();
        list_page(store, &request).await
    }

    fn install(&mut self, page: Page<T>, number: usize) {
        let mut seen = HashSet::new();
        self.items = page
            .items
            .into_iter()
            .filter(|item| seen.insert(item.id().to_string()))
            .collect();
        self.next_cursor = page.next_cursor;
        self.total_count = page.total_count;
        self.page_number = number;
    }

    /// Apply a successful mutation to the local copy. Returns `false` if the id is not loaded.
    pub fn patch(&mut self, id: &str, change: impl FnOnce(&mut T)) -> bool {
        match self.items.iter_mut().find(|item| item.id() == id) {
            Some(item) => {
                change(item);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let pos = self.items.iter().position(|item| item.id() == id)?;
        self.total_count = self.total_count.saturating_sub(1);
        Some(self.items.remove(pos))
    }

    /// Narrow the loaded page. Never queries the store.
    pub fn filtered<F: EntityFilter<T>>(&self, filter: &F) -> Vec<T> {
        apply_filters(&self.items, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::Product;
    use crate::store::{Fields, InMemoryStore};
    use serde_json::json;

    async fn seed_products(store: &InMemoryStore, count: usize) {
        for i in 0..count {
            let fields: Fields = json!({
                "name": format!("Product {i:02}"),
                "createdAt": format!("2024-01-01T00:00:{i:02}+00:00"),
                "currentStock": i,
                "isActive": true
            })
            .as_object()
            .cloned()
            .unwrap();
            store.put("products", &format!("p{i:02}"), fields).await.unwrap();
        }
    }

    #[tokio::test]
    async fn pages_are_disjoint_and_newest_first() {
        let store = InMemoryStore::new();
        seed_products(&store, 20).await;

        let first: Page<Product> = list_page(&store, &PageRequest::new(10)).await.unwrap();
        let second: Page<Product> = list_page(
            &store,
            &PageRequest::new(10).after(first.next_cursor.clone()),
        )
        .await
        .unwrap();

        assert_eq!(first.items[0].id, "p19");
        let first_ids: HashSet<_> = first.items.iter().map(|p| p.id.clone()).collect();
        assert!(second.items.iter().all(|p| !first_ids.contains(&p.id)));
        assert_eq!(second.items.len(), 10);
    }

    #[tokio::test]
    async fn zero_page_size_is_rejected() {
        let store = InMemoryStore::new();
        let result: AdminResult<Page<Product>> = list_page(&store, &PageRequest::new(0)).await;
        assert!(matches!(result, Err(AdminError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn deleted_cursor_falls_back_to_first_page() {
        let store = InMemoryStore::new();
        seed_products(&store, 5).await;
        let page: Page<Product> = list_page(
            &store,
            &PageRequest::new(2).after(Some("deleted".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(page.items[0].id, "p04");
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_page() {
        let store = InMemoryStore::new();
        seed_products(&store, 15).await;
        let mut session: ListingSession<Product> = ListingSession::new(10);
        session.load_first(&store).await.unwrap();

        store.fail_collection("products").await;
        let result = session.load_next(&store).await;
        assert!(matches!(result, Err(AdminError::QueryFailed { .. })));
        assert_eq!(session.page_number(), 1);
        assert_eq!(session.items().len(), 10);

        store.heal_collection("products").await;
        assert!(session.load_next(&store).await.unwrap());
        assert_eq!(session.items().len(), 5);
        assert!(!session.has_next());

        assert!(session.load_previous(&store).await.unwrap());
        assert_eq!(session.page_number(), 1);
        assert_eq!(session.items()[0].id, "p14");
    }

    #[tokio::test]
    async fn patch_and_remove_update_local_copy() {
        let store = InMemoryStore::new();
        seed_products(&store, 3).await;
        let mut session: ListingSession<Product> = ListingSession::new(10);
        session.load_first(&store).await.unwrap();

        assert!(session.patch("p01", |p| p.is_active = false));
        assert!(!session.patch("nope", |p| p.is_active = false));
        assert_eq!(session.get("p01").map(|p| p.is_active), Some(false));

        assert!(session.remove("p02").is_some());
        assert_eq!(session.items().len(), 2);
        assert_eq!(session.total_count(), 2);
    }
}
