use super::model::{Role, User};
use crate::error::{AdminError, AdminResult};
use crate::listing::{decode_documents, EntityKind};
use crate::store::{DocumentStore, Fields};
use crate::{mutation_error, now_timestamp, stamped};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

const COLLECTION: &str = "users";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum UserChange {
    Disabled {
        id: String,
        disabled: bool,
        updated_at: String,
    },
    EmailVerified {
        id: String,
        email_verified: bool,
        updated_at: String,
    },
    Roles {
        id: String,
        roles: BTreeSet<Role>,
        updated_at: String,
    },
}

impl UserChange {
    pub fn id(&self) -> &str {
        match self {
            UserChange::Disabled { id, .. }
            | UserChange::EmailVerified { id, .. }
            | UserChange::Roles { id, .. } => id,
        }
    }

    pub fn apply(&self, user: &mut User) {
        match self {
            UserChange::Disabled {
                disabled,
                updated_at,
                ..
            } => {
                user.disabled = *disabled;
                user.updated_at = Some(updated_at.clone());
            }
            UserChange::EmailVerified {
                email_verified,
                updated_at,
                ..
            } => {
                user.email_verified = *email_verified;
                user.updated_at = Some(updated_at.clone());
            }
            UserChange::Roles {
                roles, updated_at, ..
            } => {
                user.roles = roles.clone();
                user.updated_at = Some(updated_at.clone());
            }
        }
    }
}

/// Stored representation of a role set.
pub fn roles_value(roles: &BTreeSet<Role>) -> Value {
    Value::Array(
        roles
            .iter()
            .map(|r| Value::String(r.as_str().to_string()))
            .collect(),
    )
}

/// Parse and deduplicate role tags, rejecting anything outside {admin, seller, user}.
pub fn parse_roles<S: AsRef<str>>(raw: &[S]) -> AdminResult<BTreeSet<Role>> {
    raw.iter()
        .map(|r| r.as_ref().parse::<Role>().map_err(AdminError::InvalidRequest))
        .collect()
}

/// Load a user record, `None` when it does not exist.
pub async fn find_user(store: &dyn DocumentStore, user_id: &str) -> AdminResult<Option<User>> {
    let doc = store
        .get(COLLECTION, user_id)
        .await
        .map_err(|source| AdminError::QueryFailed {
            entity: EntityKind::Users.label(),
            source,
        })?;
    Ok(doc.and_then(|d| decode_documents::<User>(vec![d]).pop()))
}

pub async fn get_user(store: &dyn DocumentStore, user_id: &str) -> AdminResult<User> {
    find_user(store, user_id)
        .await?
        .ok_or_else(|| AdminError::NotFound(format!("user {}", user_id)))
}

pub async fn set_user_disabled(
    store: &dyn DocumentStore,
    user_id: &str,
    disabled: bool,
) -> AdminResult<UserChange> {
    let now = now_timestamp();
    store
        .update(COLLECTION, user_id, stamped("disabled", Value::Bool(disabled), &now))
        .await
        .map_err(|e| mutation_error("user", user_id, e))?;

    tracing::info!("User {} disabled set to {}", user_id, disabled);
    Ok(UserChange::Disabled {
        id: user_id.to_string(),
        disabled,
        updated_at: now,
    })
}

pub async fn set_user_email_verified(
    store: &dyn DocumentStore,
    user_id: &str,
    verified: bool,
) -> AdminResult<UserChange> {
    let now = now_timestamp();
    store
        .update(
            COLLECTION,
            user_id,
            stamped("emailVerified", Value::Bool(verified), &now),
        )
        .await
        .map_err(|e| mutation_error("user", user_id, e))?;

    tracing::info!("User {} emailVerified set to {}", user_id, verified);
    Ok(UserChange::EmailVerified {
        id: user_id.to_string(),
        email_verified: verified,
        updated_at: now,
    })
}

/// Replace the role set. An empty set is allowed.
pub async fn set_user_roles(
    store: &dyn DocumentStore,
    user_id: &str,
    roles: BTreeSet<Role>,
) -> AdminResult<UserChange> {
    let now = now_timestamp();
    store
        .update(COLLECTION, user_id, stamped("roles", roles_value(&roles), &now))
        .await
        .map_err(|e| mutation_error("user", user_id, e))?;

    tracing::info!("User {} roles set to {:?}", user_id, roles);
    Ok(UserChange::Roles {
        id: user_id.to_string(),
        roles,
        updated_at: now,
    })
}

/// Stamp `lastSignInAt` on the user record after a successful sign-in.
pub async fn record_sign_in(store: &dyn DocumentStore, user_id: &str) -> AdminResult<String> {
    let now = now_timestamp();
    let mut fields = Fields::new();
    fields.insert("lastSignInAt".to_string(), Value::String(now.clone()));
    store
        .update(COLLECTION, user_id, fields)
        .await
        .map_err(|e| mutation_error("user", user_id, e))?;
    Ok(now)
}
