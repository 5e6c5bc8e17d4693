pub mod model;
pub mod service;
pub mod http;

pub use model::{Role, User, SetDisabledPayload, SetEmailVerifiedPayload, SetRolesPayload};
pub use service::*;
