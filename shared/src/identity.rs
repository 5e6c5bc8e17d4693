use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::primitives::{DateTime, DateTimeFormat};
use aws_sdk_cognitoidentityprovider::types::AuthFlowType;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// The signed-in account as the auth service reports it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_in: i32,
}

#[derive(Debug, Clone)]
pub struct SignIn {
    pub identity: Identity,
    pub tokens: Tokens,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountMetadata {
    pub creation_time: Option<String>,
    pub last_modified_time: Option<String>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Session is missing or expired")]
    InvalidToken,
    #[error("Account {0} not found")]
    UserNotFound(String),
    #[error("Identity provider error: {0}")]
    Provider(String),
}

/// Auth collaborator: who is signed in, sign-in/out, and account metadata lookup.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_identity(&self, access_token: &str) -> Result<Identity, IdentityError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignIn, IdentityError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;

    async fn account_metadata(&self, user_id: &str) -> Result<AccountMetadata, IdentityError>;
}

/// Cognito user pool backed identity.
pub struct CognitoIdentityProvider {
    client: CognitoClient,
    client_id: String,
    client_secret: String,
    user_pool_id: String,
}

impl CognitoIdentityProvider {
    pub fn new(
        client: CognitoClient,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        user_pool_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            user_pool_id: user_pool_id.into(),
        }
    }
}

/// `SECRET_HASH` for app clients with a secret: base64(HMAC-SHA256(secret, username + client_id)).
pub fn secret_hash(username: &str, client_id: &str, client_secret: &str) -> Result<String, IdentityError> {
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|e| IdentityError::Provider(format!("HMAC error: {}", e)))?;
    mac.update(username.as_bytes());
    mac.update(client_id.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn format_time(value: Option<&DateTime>) -> Option<String> {
    value.and_then(|t| t.fmt(DateTimeFormat::DateTime).ok())
}

#[async_trait]
impl IdentityProvider for CognitoIdentityProvider {
    async fn current_identity(&self, access_token: &str) -> Result<Identity, IdentityError> {
        let result = self
            .client
            .get_user()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_not_authorized_exception() || service.is_user_not_found_exception() {
                    IdentityError::InvalidToken
                } else {
                    IdentityError::Provider(format!("GetUser error: {}", service))
                }
            })?;

        let attribute = |name: &str| {
            result
                .user_attributes()
                .iter()
                .find(|a| a.name() == name)
                .and_then(|a| a.value())
                .map(|v| v.to_string())
        };

        Ok(Identity {
            uid: attribute("sub").unwrap_or_else(|| result.username().to_string()),
            email: attribute("email"),
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignIn, IdentityError> {
        let hash = secret_hash(email, &self.client_id, &self.client_secret)?;

        let result = self
            .client
            .initiate_auth()
            .client_id(&self.client_id)
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .auth_parameters("USERNAME", email)
            .auth_parameters("PASSWORD", password)
            .auth_parameters("SECRET_HASH", hash)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_not_authorized_exception() || service.is_user_not_found_exception() {
                    IdentityError::InvalidCredentials
                } else {
                    tracing::error!("Cognito InitiateAuth failed: {}", service);
                    IdentityError::Provider(format!("InitiateAuth error: {}", service))
                }
            })?;

        let auth = result
            .authentication_result()
            .ok_or_else(|| IdentityError::Provider("sign-in challenge not supported".to_string()))?;
        let access_token = auth
            .access_token()
            .ok_or_else(|| IdentityError::Provider("no access token returned".to_string()))?
            .to_string();

        let tokens = Tokens {
            access_token,
            refresh_token: auth.refresh_token().map(|t| t.to_string()),
            id_token: auth.id_token().map(|t| t.to_string()),
            expires_in: auth.expires_in(),
        };
        let identity = self.current_identity(&tokens.access_token).await?;

        Ok(SignIn { identity, tokens })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        self.client
            .global_sign_out()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| IdentityError::Provider(format!("GlobalSignOut error: {}", e)))?;
        Ok(())
    }

    async fn account_metadata(&self, user_id: &str) -> Result<AccountMetadata, IdentityError> {
        let result = self
            .client
            .admin_get_user()
            .user_pool_id(&self.user_pool_id)
            .username(user_id)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_user_not_found_exception() {
                    IdentityError::UserNotFound(user_id.to_string())
                } else {
                    IdentityError::Provider(format!("AdminGetUser error: {}", service))
                }
            })?;

        Ok(AccountMetadata {
            creation_time: format_time(result.user_create_date()),
            last_modified_time: format_time(result.user_last_modified_date()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_hash_is_base64_of_a_sha256_mac() {
        let hash = secret_hash("admin@haul.ph", "client-id", "client-secret").unwrap();
        let raw = general_purpose::STANDARD.decode(&hash).unwrap();
        assert_eq!(raw.len(), 32);
        assert_eq!(
            hash,
            secret_hash("admin@haul.ph", "client-id", "client-secret").unwrap()
        );
        assert_ne!(
            hash,
            secret_hash("other@haul.ph", "client-id", "client-secret").unwrap()
        );
    }
}
