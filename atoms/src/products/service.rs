use super::model::Product;
use crate::error::{AdminError, AdminResult};
use crate::listing::{decode_documents, EntityKind};
use crate::store::DocumentStore;
use crate::{mutation_error, now_timestamp, stamped};
use serde::Serialize;
use serde_json::Value;

const COLLECTION: &str = "products";

/// Field delta that was written to the store, replayable on a local copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ProductChange {
    Active {
        id: String,
        is_active: bool,
        updated_at: String,
    },
    Stock {
        id: String,
        current_stock: i64,
        updated_at: String,
    },
    Deleted {
        id: String,
    },
}

impl ProductChange {
    pub fn id(&self) -> &str {
        match self {
            ProductChange::Active { id, .. }
            | ProductChange::Stock { id, .. }
            | ProductChange::Deleted { id } => id,
        }
    }

    /// Patch the local copy. Deletions are handled by the caller removing the item.
    pub fn apply(&self, product: &mut Product) {
        match self {
            ProductChange::Active {
                is_active,
                updated_at,
                ..
            } => {
                product.is_active = *is_active;
                product.updated_at = Some(updated_at.clone());
            }
            ProductChange::Stock {
                current_stock,
                updated_at,
                ..
            } => {
                product.current_stock = *current_stock;
                product.updated_at = Some(updated_at.clone());
            }
            ProductChange::Deleted { .. } => {}
        }
    }
}

pub async fn get_product(store: &dyn DocumentStore, product_id: &str) -> AdminResult<Product> {
    let doc = store
        .get(COLLECTION, product_id)
        .await
        .map_err(|source| AdminError::QueryFailed {
            entity: EntityKind::Products.label(),
            source,
        })?
        .ok_or_else(|| AdminError::NotFound(format!("product {}", product_id)))?;

    decode_documents::<Product>(vec![doc])
        .pop()
        .ok_or_else(|| AdminError::NotFound(format!("product {}", product_id)))
}

pub async fn set_product_active(
    store: &dyn DocumentStore,
    product_id: &str,
    active: bool,
) -> AdminResult<ProductChange> {
    let now = now_timestamp();
    store
        .update(COLLECTION, product_id, stamped("isActive", Value::Bool(active), &now))
        .await
        .map_err(|e| mutation_error("product", product_id, e))?;

    tracing::info!("Product {} active set to {}", product_id, active);
    Ok(ProductChange::Active {
        id: product_id.to_string(),
        is_active: active,
        updated_at: now,
    })
}

pub async fn set_product_stock(
    store: &dyn DocumentStore,
    product_id: &str,
    stock: i64,
) -> AdminResult<ProductChange> {
    if stock < 0 {
        return Err(AdminError::InvalidRequest(
            "stock must be a non-negative integer".to_string(),
        ));
    }

    let now = now_timestamp();
    store
        .update(COLLECTION, product_id, stamped("currentStock", Value::from(stock), &now))
        .await
        .map_err(|e| mutation_error("product", product_id, e))?;

    tracing::info!("Product {} stock set to {}", product_id, stock);
    Ok(ProductChange::Stock {
        id: product_id.to_string(),
        current_stock: stock,
        updated_at: now,
    })
}

/// Irreversible. Deleting an id that is already gone succeeds.
pub async fn delete_product(
    store: &dyn DocumentStore,
    product_id: &str,
) -> AdminResult<ProductChange> {
    store
        .delete(COLLECTION, product_id)
        .await
        .map_err(|e| mutation_error("product", product_id, e))?;

    tracing::info!("Product {} deleted", product_id);
    Ok(ProductChange::Deleted {
        id: product_id.to_string(),
    })
}
