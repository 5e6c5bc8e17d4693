pub mod model;
pub mod service;
pub mod http;

pub use model::{ApplicationStatus, DecisionPayload, SellerApplication};
pub use service::*;
