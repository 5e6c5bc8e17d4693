use std::env;
use thiserror::Error;

pub const DEFAULT_TABLE_NAME: &str = "haul-admin";
pub const DEFAULT_ALLOWED_ORIGINS: &str = "https://admin.haul.ph,http://localhost:3000";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub table_name: String,
    pub cognito_client_id: String,
    pub cognito_client_secret: String,
    pub cognito_user_pool_id: String,
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let allowed_origins = get("ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Ok(Self {
            table_name: get("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            cognito_client_id: required("COGNITO_CLIENT_ID")?,
            cognito_client_secret: required("COGNITO_CLIENT_SECRET")?,
            cognito_user_pool_id: required("COGNITO_USER_POOL_ID")?,
            allowed_origins,
        })
    }

    /// Origin to echo in `Access-Control-Allow-Origin`: the caller's when allowed,
    /// otherwise the first configured origin.
    pub fn cors_origin(&self, request_origin: Option<&str>) -> String {
        match request_origin {
            Some(origin) if self.allowed_origins.iter().any(|o| o == origin) => origin.to_string(),
            _ => self
                .allowed_origins
                .first()
                .cloned()
                .unwrap_or_else(|| "*".to_string()),
        }
    }
}
