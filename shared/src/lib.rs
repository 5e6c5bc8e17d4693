pub mod auth;
pub mod config;
pub mod identity;
pub mod privileged;

use config::AppConfig;
use haul_atoms::store::DocumentStore;
use identity::IdentityProvider;
use std::sync::Arc;

/// Shared application state, built once per Lambda cold start.
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        config: AppConfig,
    ) -> Self {
        Self {
            store,
            identity,
            config,
        }
    }
}
