use crate::identity::{Identity, IdentityError, IdentityProvider};
use haul_atoms::http as responses;
use haul_atoms::store::DocumentStore;
use haul_atoms::users::{self, Role};
use haul_atoms::{AdminError, AdminResult};
use lambda_http::http::StatusCode;
use lambda_http::{Body, Error, Response};
use serde::{Deserialize, Serialize};

pub const ACCESS_TOKEN_COOKIE: &str = "haul_access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "haul_refresh_token";
pub const REFRESH_TOKEN_MAX_AGE: i64 = 30 * 24 * 60 * 60;

/// Outcome of the session guard.
#[derive(Debug, Clone, Serialize)]
pub struct Authorization {
    pub authorized: bool,
    pub identity: Option<Identity>,
}

impl Authorization {
    fn denied(identity: Option<Identity>) -> Self {
        Self {
            authorized: false,
            identity,
        }
    }
}

/// Read a cookie value out of a raw `Cookie` header.
pub fn read_cookie(cookie_header: Option<&str>, name: &str) -> Option<String> {
    cookie_header?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Access token from the session cookie, else from an `Authorization: Bearer` header.
pub fn access_token(cookie_header: Option<&str>, authorization: Option<&str>) -> Option<String> {
    read_cookie(cookie_header, ACCESS_TOKEN_COOKIE).or_else(|| {
        authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

pub fn session_cookie(name: &str, value: &str, max_age: i64) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=None",
        name, value, max_age
    )
}

pub fn clear_cookie(name: &str) -> String {
    format!(
        "{}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=None",
        name
    )
}

/// Session guard. Resolves the signed-in identity and checks its user record carries
/// the admin role. Reads only.
pub async fn authorize(
    store: &dyn DocumentStore,
    identity: &dyn IdentityProvider,
    access_token: Option<&str>,
) -> AdminResult<Authorization> {
    let Some(token) = access_token else {
        return Ok(Authorization::denied(None));
    };

    let current = match identity.current_identity(token).await {
        Ok(current) => current,
        Err(IdentityError::InvalidToken) => return Ok(Authorization::denied(None)),
        Err(e) => {
            tracing::error!("Failed to resolve signed-in identity: {}", e);
            return Err(AdminError::Unauthenticated);
        }
    };

    match users::find_user(store, &current.uid).await? {
        Some(user) if user.has_role(Role::Admin) => Ok(Authorization {
            authorized: true,
            identity: Some(current),
        }),
        Some(_) => {
            tracing::warn!("User {} is signed in but not an admin", current.uid);
            Ok(Authorization::denied(Some(current)))
        }
        None => {
            tracing::warn!("Signed-in user {} has no user record", current.uid);
            Ok(Authorization::denied(Some(current)))
        }
    }
}

/// `authorize` folded into an error: no identity is `Unauthenticated`, a
/// non-admin identity is `PermissionDenied`.
pub async fn require_admin(
    store: &dyn DocumentStore,
    identity: &dyn IdentityProvider,
    access_token: Option<&str>,
) -> AdminResult<Identity> {
    let auth = authorize(store, identity, access_token).await?;
    match (auth.authorized, auth.identity) {
        (true, Some(identity)) => Ok(identity),
        (false, Some(identity)) => Err(AdminError::PermissionDenied(format!(
            "{} is not an admin",
            identity.email.as_deref().unwrap_or(&identity.uid)
        ))),
        _ => Err(AdminError::Unauthenticated),
    }
}

/// Cookie/bearer guard for routed requests. The error side is a ready-to-send response.
pub async fn authenticate_cookie_request(
    store: &dyn DocumentStore,
    identity: &dyn IdentityProvider,
    cookie_header: Option<&str>,
    authorization: Option<&str>,
) -> Result<Identity, Response<Body>> {
    let token = access_token(cookie_header, authorization);
    match require_admin(store, identity, token.as_deref()).await {
        Ok(identity) => Ok(identity),
        Err(e) => Err(responses::error_response(&e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

/// Sign in with email and password. Only admins get session cookies.
pub async fn login(
    store: &dyn DocumentStore,
    identity: &dyn IdentityProvider,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: LoginPayload = match responses::parse_body(body) {
        Ok(req) => req,
        Err(e) => return Ok(responses::error_response(&e)),
    };

    let signed_in = match identity.sign_in(req.email.trim(), &req.password).await {
        Ok(signed_in) => signed_in,
        Err(IdentityError::InvalidCredentials) => {
            tracing::warn!("Failed sign-in for {}", req.email);
            return Ok(responses::json_with_status(
                StatusCode::UNAUTHORIZED,
                serde_json::json!({"error": "InvalidCredentials", "message": "Invalid email or password"}),
            ));
        }
        Err(e) => {
            tracing::error!("Sign-in failed: {}", e);
            return Ok(responses::error_response(&AdminError::Unauthenticated));
        }
    };

    let token = signed_in.tokens.access_token.as_str();
    let admin = match require_admin(store, identity, Some(token)).await {
        Ok(admin) => admin,
        Err(e) => {
            // Non-admins must not keep a session on this portal.
            let _ = identity.sign_out(token).await;
            return Ok(responses::error_response(&e));
        }
    };

    if let Err(e) = users::record_sign_in(store, &admin.uid).await {
        tracing::warn!("Could not record sign-in for {}: {}", admin.uid, e);
    }
    tracing::info!("Admin {} signed in", admin.uid);

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header(
            "Set-Cookie",
            session_cookie(
                ACCESS_TOKEN_COOKIE,
                token,
                i64::from(signed_in.tokens.expires_in),
            ),
        );
    if let Some(refresh) = signed_in.tokens.refresh_token.as_deref() {
        builder = builder.header(
            "Set-Cookie",
            session_cookie(REFRESH_TOKEN_COOKIE, refresh, REFRESH_TOKEN_MAX_AGE),
        );
    }
    Ok(builder
        .body(serde_json::to_string(&admin)?.into())
        .map_err(Box::new)?)
}

/// Revoke the session (best effort) and clear its cookies.
pub async fn logout(
    identity: &dyn IdentityProvider,
    access_token: Option<&str>,
) -> Result<Response<Body>, Error> {
    if let Some(token) = access_token {
        if let Err(e) = identity.sign_out(token).await {
            tracing::warn!("Sign-out failed: {}", e);
        }
    }
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Set-Cookie", clear_cookie(ACCESS_TOKEN_COOKIE))
        .header("Set-Cookie", clear_cookie(REFRESH_TOKEN_COOKIE))
        .body(serde_json::json!({"message": "ok"}).to_string().into())
        .map_err(Box::new)?)
}

/// Current guard result, for the front end to decide whether to show the portal.
pub async fn session(
    store: &dyn DocumentStore,
    identity: &dyn IdentityProvider,
    access_token: Option<&str>,
) -> Result<Response<Body>, Error> {
    responses::respond(authorize(store, identity, access_token).await, StatusCode::OK)
}


#[cfg(test)]
mod tests {
    use super::fake::FakeIdentity;
    use super::*;
    use haul_atoms::store::InMemoryStore;
    use serde_json::json;

    async fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .put(
                "users",
                "boss",
                json!({"email": "boss@haul.ph", "roles": ["admin", "user"]})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();
        store
            .put(
                "users",
                "shopper",
                json!({"email": "shopper@haul.ph", "roles": ["user"]})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();
        store
    }

    #[test]
    fn token_is_read_from_cookie_before_bearer_header() {
        let cookies = "theme=dark; haul_access_token=abc; other=1";
        assert_eq!(
            access_token(Some(cookies), Some("Bearer xyz")).as_deref(),
            Some("abc")
        );
        assert_eq!(
            access_token(Some("theme=dark"), Some("Bearer xyz")).as_deref(),
            Some("xyz")
        );
        assert_eq!(access_token(None, Some("Basic abc")), None);
    }

    #[tokio::test]
    async fn admin_session_is_authorized() {
        let store = store().await;
        let identity = FakeIdentity::default().with_session("t1", "boss");
        let auth = authorize(&store, &identity, Some("t1")).await.unwrap();
        assert!(auth.authorized);
        assert_eq!(auth.identity.unwrap().uid, "boss");
    }

    #[tokio::test]
    async fn non_admin_and_unknown_users_are_denied() {
        let store = store().await;
        let identity = FakeIdentity::default()
            .with_session("t2", "shopper")
            .with_session("t3", "ghost");

        assert!(!authorize(&store, &identity, Some("t2")).await.unwrap().authorized);
        assert!(!authorize(&store, &identity, Some("t3")).await.unwrap().authorized);
        assert!(matches!(
            require_admin(&store, &identity, Some("t2")).await,
            Err(AdminError::PermissionDenied(_))
        ));
        assert!(matches!(
            require_admin(&store, &identity, None).await,
            Err(AdminError::Unauthenticated)
        ));
        assert!(matches!(
            require_admin(&store, &identity, Some("expired")).await,
            Err(AdminError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn guard_response_carries_status() {
        let store = store().await;
        let identity = FakeIdentity::default().with_session("t2", "shopper");
        let resp = authenticate_cookie_request(
            &store,
            &identity,
            Some("haul_access_token=t2"),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(resp.status(), 403);
    }

    #[tokio::test]
    async fn login_sets_cookies_and_records_sign_in() {
        let store = store().await;
        let mut identity = FakeIdentity::default().with_session("token-boss", "boss");
        identity.passwords.insert(
            "boss@haul.ph".to_string(),
            (
                "hunter2".to_string(),
                Identity {
                    uid: "boss".to_string(),
                    email: Some("boss@haul.ph".to_string()),
                },
            ),
        );

        let resp = login(
            &store,
            &identity,
            br#"{"email": "boss@haul.ph", "password": "hunter2"}"#,
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), 200);
        let cookie = resp.headers().get("Set-Cookie").unwrap().to_str().unwrap();
        assert!(cookie.starts_with("haul_access_token=token-boss;"));

        let user = users::get_user(&store, "boss").await.unwrap();
        assert!(user.last_sign_in_at.is_some());
    }

    #[tokio::test]
    async fn login_refuses_non_admins() {
        let store = store().await;
        let mut identity = FakeIdentity::default().with_session("token-shopper", "shopper");
        identity.passwords.insert(
            "shopper@haul.ph".to_string(),
            (
                "pw".to_string(),
                Identity {
                    uid: "shopper".to_string(),
                    email: Some("shopper@haul.ph".to_string()),
                },
            ),
        );

        let resp = login(
            &store,
            &identity,
            br#"{"email": "shopper@haul.ph", "password": "pw"}"#,
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), 403);
        assert!(resp.headers().get("Set-Cookie").is_none());

        let wrong = login(
            &store,
            &identity,
            br#"{"email": "shopper@haul.ph", "password": "nope"}"#,
        )
        .await
        .unwrap();
        assert_eq!(wrong.status(), 401);
    }
}
