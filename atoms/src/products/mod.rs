pub mod model;
pub mod service;
pub mod http;

pub use model::{Product, SetActivePayload, SetStockPayload, StockLevel, DEFAULT_MINIMUM_STOCK};
pub use service::*;
