//! Callable operations for admin tooling. Each call re-checks the caller's admin
//! role against the `users` collection before touching anything else.
use crate::auth;
use crate::identity::IdentityProvider;
use haul_atoms::http::json_with_status;
use haul_atoms::listing::{list_page, PageRequest, DEFAULT_PAGE_SIZE};
use haul_atoms::store::{DocumentStore, Filter};
use haul_atoms::users::{self, User};
use haul_atoms::AdminError;
use lambda_http::http::StatusCode;
use lambda_http::{Body, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CallableError {
    #[error("Must be signed in")]
    Unauthenticated,
    #[error("Must be an admin")]
    PermissionDenied,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Unknown(String),
    #[error("{0}")]
    Internal(String),
}

impl CallableError {
    pub fn code(&self) -> &'static str {
        match self {
            CallableError::Unauthenticated => "unauthenticated",
            CallableError::PermissionDenied => "permission-denied",
            CallableError::InvalidArgument(_) => "invalid-argument",
            CallableError::Unknown(_) => "unknown",
            CallableError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CallableError::Unauthenticated => StatusCode::UNAUTHORIZED,
            CallableError::PermissionDenied => StatusCode::FORBIDDEN,
            CallableError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CallableError::Unknown(_) | CallableError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreationDateRequest {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreationDate {
    pub creation_time: Option<String>,
    pub last_sign_in_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllUsersRequest {
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub last_visible: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllUsers {
    pub users: Vec<User>,
    pub last_visible: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallableStats {
    pub user_count: u64,
    pub product_count: u64,
    pub order_count: u64,
    pub seller_count: u64,
}

async fn caller_must_be_admin(
    store: &dyn DocumentStore,
    identity: &dyn IdentityProvider,
    access_token: Option<&str>,
) -> Result<(), CallableError> {
    match auth::require_admin(store, identity, access_token).await {
        Ok(_) => Ok(()),
        Err(AdminError::Unauthenticated) => Err(CallableError::Unauthenticated),
        Err(AdminError::PermissionDenied(_)) => Err(CallableError::PermissionDenied),
        Err(e) => {
            tracing::error!("Admin check failed: {}", e);
            Err(CallableError::Internal(e.to_string()))
        }
    }
}

/// Account creation and last sign-in time for any user.
pub async fn get_user_creation_date(
    store: &dyn DocumentStore,
    identity: &dyn IdentityProvider,
    access_token: Option<&str>,
    request: UserCreationDateRequest,
) -> Result<UserCreationDate, CallableError> {
    caller_must_be_admin(store, identity, access_token).await?;

    if request.user_id.trim().is_empty() {
        return Err(CallableError::InvalidArgument("userId is required".to_string()));
    }

    let metadata = identity
        .account_metadata(&request.user_id)
        .await
        .map_err(|e| {
            tracing::error!("Error fetching user data for {}: {}", request.user_id, e);
            CallableError::Unknown(e.to_string())
        })?;
    let user = users::find_user(store, &request.user_id)
        .await
        .map_err(|e| CallableError::Unknown(e.to_string()))?;

    Ok(UserCreationDate {
        creation_time: metadata.creation_time,
        last_sign_in_time: user.and_then(|u| u.last_sign_in_at),
    })
}

/// One page of users ordered by email.
pub async fn get_all_users(
    store: &dyn DocumentStore,
    identity: &dyn IdentityProvider,
    access_token: Option<&str>,
    request: AllUsersRequest,
) -> Result<AllUsers, CallableError> {
    caller_must_be_admin(store, identity, access_token).await?;

    let page_request = PageRequest::new(request.page_size.unwrap_or(DEFAULT_PAGE_SIZE))
        .after(request.last_visible);
    let page = list_page::<User>(store, &page_request)
        .await
        .map_err(|e| match e {
            AdminError::InvalidRequest(msg) => CallableError::InvalidArgument(msg),
            other => {
                tracing::error!("Error listing users: {}", other);
                CallableError::Internal(other.to_string())
            }
        })?;

    Ok(AllUsers {
        users: page.items,
        last_visible: page.next_cursor,
    })
}

/// Headline counts for admin tooling.
pub async fn get_dashboard_stats(
    store: &dyn DocumentStore,
    identity: &dyn IdentityProvider,
    access_token: Option<&str>,
) -> Result<CallableStats, CallableError> {
    caller_must_be_admin(store, identity, access_token).await?;

    let sellers_filter = [Filter::contains("roles", "seller")];
    let (users, products, orders, sellers) = tokio::join!(
        store.count("users", &[]),
        store.count("products", &[]),
        store.count("orders", &[]),
        store.count("users", &sellers_filter),
    );

    let internal = |e: haul_atoms::store::StoreError| {
        tracing::error!("Error counting dashboard stats: {}", e);
        CallableError::Internal(e.to_string())
    };
    Ok(CallableStats {
        user_count: users.map_err(internal)?,
        product_count: products.map_err(internal)?,
        order_count: orders.map_err(internal)?,
        seller_count: sellers.map_err(internal)?,
    })
}

/// Callable payloads arrive as `{"data": {...}}`; a bare object or empty body is accepted too.
pub fn parse_callable<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, CallableError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| CallableError::InvalidArgument(format!("malformed body: {}", e)))?;
    let data = match value {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    };
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data).map_err(|e| CallableError::InvalidArgument(e.to_string()))
}

/// Callable-protocol envelope: `{"result": ...}` or `{"error": {"status", "message"}}`.
pub fn callable_response<T: Serialize>(result: Result<T, CallableError>) -> Response<Body> {
    match result.and_then(|value| {
        serde_json::to_value(value).map_err(|e| CallableError::Internal(e.to_string()))
    }) {
        Ok(value) => json_with_status(StatusCode::OK, serde_json::json!({ "result": value })),
        Err(e) => {
            tracing::warn!("Callable failed with {}: {}", e.code(), e);
            json_with_status(
                e.status(),
                serde_json::json!({"error": {"status": e.code(), "message": e.to_string()}}),
            )
        }
    }
}

/// Route a callable by name. `None` when no callable has that name.
pub async fn dispatch(
    store: &dyn DocumentStore,
    identity: &dyn IdentityProvider,
    name: &str,
    access_token: Option<&str>,
    body: &[u8],
) -> Option<Response<Body>> {
    let resp = match name {
        "getUserCreationDate" => match parse_callable(body) {
            Ok(request) => callable_response(
                get_user_creation_date(store, identity, access_token, request).await,
            ),
            Err(e) => callable_response::<()>(Err(e)),
        },
        "getAllUsers" => match parse_callable(body) {
            Ok(request) => {
                callable_response(get_all_users(store, identity, access_token, request).await)
            }
            Err(e) => callable_response::<()>(Err(e)),
        },
        "getDashboardStats" => {
            callable_response(get_dashboard_stats(store, identity, access_token).await)
        }
        _ => return None,
    };
    Some(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::fake::FakeIdentity;
    use crate::identity::AccountMetadata;
    use haul_atoms::store::{Fields, InMemoryStore};
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .put(
                "users",
                "boss",
                fields(json!({"email": "boss@haul.ph", "roles": ["admin"]})),
            )
            .await
            .unwrap();
        store
            .put(
                "users",
                "u1",
                fields(json!({
                    "email": "a@haul.ph",
                    "roles": ["user", "seller"],
                    "lastSignInAt": "2024-06-01T09:00:00+00:00"
                })),
            )
            .await
            .unwrap();
        store
            .put("users", "u2", fields(json!({"email": "b@haul.ph", "roles": ["user"]})))
            .await
            .unwrap();
        store.put("products", "p1", fields(json!({"name": "Mug"}))).await.unwrap();
        store.put("orders", "o1", fields(json!({}))).await.unwrap();
        store.put("orders", "o2", fields(json!({}))).await.unwrap();
        store
    }

    fn identity() -> FakeIdentity {
        let mut identity = FakeIdentity::default()
            .with_session("admin-token", "boss")
            .with_session("user-token", "u2");
        identity.metadata.insert(
            "u1".to_string(),
            AccountMetadata {
                creation_time: Some("2023-01-15T00:00:00Z".to_string()),
                last_modified_time: None,
            },
        );
        identity
    }

    #[tokio::test]
    async fn non_admin_gets_permission_denied_for_stats() {
        let store = seeded().await;
        let result = get_dashboard_stats(&store, &identity(), Some("user-token")).await;
        assert_eq!(result, Err(CallableError::PermissionDenied));
    }

    #[tokio::test]
    async fn anonymous_caller_is_unauthenticated() {
        let store = seeded().await;
        let result = get_dashboard_stats(&store, &identity(), None).await;
        assert_eq!(result.unwrap_err().code(), "unauthenticated");
    }

    #[tokio::test]
    async fn admin_gets_all_four_counts() {
        let store = seeded().await;
        let stats = get_dashboard_stats(&store, &identity(), Some("admin-token"))
            .await
            .unwrap();
        assert_eq!(
            stats,
            CallableStats {
                user_count: 3,
                product_count: 1,
                order_count: 2,
                seller_count: 1,
            }
        );
    }

    #[tokio::test]
    async fn count_failure_is_internal() {
        let store = seeded().await;
        store.fail_collection("orders").await;
        let result = get_dashboard_stats(&store, &identity(), Some("admin-token")).await;
        assert_eq!(result.unwrap_err().code(), "internal");
    }

    #[tokio::test]
    async fn creation_date_combines_account_and_user_record() {
        let store = seeded().await;
        let result = get_user_creation_date(
            &store,
            &identity(),
            Some("admin-token"),
            UserCreationDateRequest {
                user_id: "u1".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(result.creation_time.as_deref(), Some("2023-01-15T00:00:00Z"));
        assert_eq!(
            result.last_sign_in_time.as_deref(),
            Some("2024-06-01T09:00:00+00:00")
        );
    }

    #[tokio::test]
    async fn lookup_failure_is_unknown() {
        let store = seeded().await;
        let result = get_user_creation_date(
            &store,
            &identity(),
            Some("admin-token"),
            UserCreationDateRequest {
                user_id: "nobody".to_string(),
            },
        )
        .await;
        assert!(matches!(result, Err(CallableError::Unknown(_))));
    }

    #[tokio::test]
    async fn all_users_pages_by_email() {
        let store = seeded().await;
        let first = get_all_users(
            &store,
            &identity(),
            Some("admin-token"),
            AllUsersRequest {
                page_size: Some(2),
                last_visible: None,
            },
        )
        .await
        .unwrap();
        let emails: Vec<_> = first.users.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["a@haul.ph", "b@haul.ph"]);

        let second = get_all_users(
            &store,
            &identity(),
            Some("admin-token"),
            AllUsersRequest {
                page_size: Some(2),
                last_visible: first.last_visible,
            },
        )
        .await
        .unwrap();
        assert_eq!(second.users.len(), 1);
        assert_eq!(second.users[0].id, "boss");
        assert_eq!(second.last_visible, None);
    }

    #[test]
    fn callable_body_accepts_data_envelope() {
        let request: AllUsersRequest =
            parse_callable(br#"{"data": {"pageSize": 5, "lastVisible": "u1"}}"#).unwrap();
        assert_eq!(request.page_size, Some(5));
        assert_eq!(request.last_visible.as_deref(), Some("u1"));

        let empty: AllUsersRequest = parse_callable(b"").unwrap();
        assert_eq!(empty.page_size, None);
    }

    #[tokio::test]
    async fn unknown_callable_is_not_dispatched() {
        let store = seeded().await;
        assert!(dispatch(&store, &identity(), "dropTables", Some("admin-token"), b"")
            .await
            .is_none());
        let resp = dispatch(&store, &identity(), "getDashboardStats", Some("user-token"), b"")
            .await
            .unwrap();
        assert_eq!(resp.status(), 403);
    }
}
