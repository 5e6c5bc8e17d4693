use crate::listing::{Entity, EntityKind};
use serde::{Deserialize, Serialize};

/// Threshold used when a product has no (or a zero) minimum stock.
pub const DEFAULT_MINIMUM_STOCK: i64 = 5;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, rename = "sellingPrice", alias = "price")]
    pub price: f64,
    #[serde(default)]
    pub sale_price: Option<f64>,
    #[serde(default)]
    pub current_stock: i64,
    #[serde(default)]
    pub minimum_stock: Option<i64>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub seller_id: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    InStock,
    LowStock,
    OutOfStock,
}

impl Product {
    pub fn minimum_stock_or(&self, default: i64) -> i64 {
        self.minimum_stock.filter(|m| *m != 0).unwrap_or(default)
    }

    pub fn stock_level(&self) -> StockLevel {
        if self.current_stock == 0 {
            StockLevel::OutOfStock
        } else if self.current_stock <= self.minimum_stock_or(DEFAULT_MINIMUM_STOCK) {
            StockLevel::LowStock
        } else {
            StockLevel::InStock
        }
    }

    /// At or under the minimum, which includes out of stock.
    pub fn is_low_stock(&self) -> bool {
        self.stock_level() != StockLevel::InStock
    }
}

impl Entity for Product {
    const KIND: EntityKind = EntityKind::Products;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActivePayload {
    #[serde(alias = "is_active")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStockPayload {
    #[serde(alias = "current_stock")]
    pub current_stock: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stocked(current: i64, minimum: Option<i64>) -> Product {
        Product {
            current_stock: current,
            minimum_stock: minimum,
            ..Default::default()
        }
    }

    #[test]
    fn stock_level_uses_minimum_or_default() {
        assert_eq!(stocked(0, Some(10)).stock_level(), StockLevel::OutOfStock);
        assert_eq!(stocked(5, None).stock_level(), StockLevel::LowStock);
        assert_eq!(stocked(6, None).stock_level(), StockLevel::InStock);
        assert_eq!(stocked(6, Some(0)).stock_level(), StockLevel::InStock);
        assert_eq!(stocked(10, Some(10)).stock_level(), StockLevel::LowStock);
        assert!(stocked(0, None).is_low_stock());
        assert!(!stocked(11, Some(10)).is_low_stock());
    }
}
