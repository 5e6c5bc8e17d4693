use haul_atoms as atoms;
use haul_atoms::http::{self as responses, ListParams};
use haul_atoms::AdminError;
use haul_shared::{auth, privileged, AppState};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};

use lambda_http::http::header::{HeaderValue, VARY};

fn with_cors_headers(mut resp: Response<Body>, cors_origin: &str) -> Response<Body> {
    let headers = resp.headers_mut();
    headers.insert(
        "Access-Control-Allow-Origin",
        HeaderValue::from_str(cors_origin).unwrap_or_else(|_| HeaderValue::from_static("*")),
    );
    headers.insert("Access-Control-Allow-Credentials", HeaderValue::from_static("true"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET,POST,PUT,PATCH,DELETE,OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type,Authorization,Cookie"),
    );
    headers.append(VARY, HeaderValue::from_static("Origin"));

    resp
}

fn finalize_response(
    resp: Result<Response<Body>, Error>,
    cors_origin: &str,
) -> Result<Response<Body>, Error> {
    resp.map(|r| with_cors_headers(r, cors_origin))
}

fn query_param(event: &Request, key: &str) -> Option<String> {
    event
        .query_string_parameters_ref()
        .and_then(|params| params.first(key))
        .map(|v| v.to_string())
}

fn list_params(event: &Request) -> Result<ListParams, AdminError> {
    ListParams::from_query(|key| query_param(event, key))
}

use std::sync::Arc;

/// Main Lambda handler - session routes, callables, then admin-only routes
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let body = event.body();
    let request_origin = event.headers().get("Origin").and_then(|v| v.to_str().ok());
    let cors_origin = state.config.cors_origin(request_origin);
    tracing::info!("Admin API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == Method::OPTIONS {
        let resp = Response::builder()
            .status(StatusCode::OK)
            .body(Body::Empty)
            .map_err(Box::new)?;
        return Ok(with_cors_headers(resp, &cors_origin));
    }

    let store = state.store.as_ref();
    let identity = state.identity.as_ref();
    let cookie_header = event.headers().get("Cookie").and_then(|v| v.to_str().ok());
    let authorization = event
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // Session routes (no guard)
    match (method, parts.as_slice()) {
        (&Method::POST, ["login"]) => {
            return finalize_response(auth::login(store, identity, body).await, &cors_origin);
        }
        (&Method::POST, ["logout"]) => {
            let token = auth::access_token(cookie_header, authorization);
            return finalize_response(
                auth::logout(identity, token.as_deref()).await,
                &cors_origin,
            );
        }
        (&Method::GET, ["session"]) => {
            let token = auth::access_token(cookie_header, authorization);
            return finalize_response(
                auth::session(store, identity, token.as_deref()).await,
                &cors_origin,
            );
        }
        (_, ["login"]) | (_, ["logout"]) | (_, ["session"]) => {
            return finalize_response(responses::method_not_allowed(), &cors_origin);
        }
        _ => {}
    }

    // Callables check the admin role themselves and answer in their own envelope
    if let (&Method::POST, ["callable", name]) = (method, parts.as_slice()) {
        let token = auth::access_token(cookie_header, authorization);
        return match privileged::dispatch(store, identity, name, token.as_deref(), body).await {
            Some(resp) => Ok(with_cors_headers(resp, &cors_origin)),
            None => finalize_response(responses::not_found(), &cors_origin),
        };
    }

    // All other routes require an admin session
    let admin = match auth::authenticate_cookie_request(store, identity, cookie_header, authorization)
        .await
    {
        Ok(admin) => admin,
        Err(resp) => return Ok(with_cors_headers(resp, &cors_origin)),
    };
    tracing::info!("Admin {} - {} {}", admin.uid, method, path);

    let resp = match (method, parts.as_slice()) {
        // --- USERS ---
        // GET /users - paged by email
        (&Method::GET, ["users"]) => match list_params(&event) {
            Ok(params) => atoms::users::http::list_users(store, &params).await,
            Err(e) => Ok(responses::error_response(&e)),
        },
        // PATCH /users/{id}/disabled
        (&Method::PATCH, ["users", user_id, "disabled"]) => {
            atoms::users::http::set_disabled(store, user_id, body).await
        }
        // PATCH /users/{id}/email-verified
        (&Method::PATCH, ["users", user_id, "email-verified"]) => {
            atoms::users::http::set_email_verified(store, user_id, body).await
        }
        // PUT /users/{id}/roles
        (&Method::PUT, ["users", user_id, "roles"]) => {
            atoms::users::http::set_roles(store, user_id, body).await
        }

        // --- PRODUCTS ---
        // GET /products - newest first
        (&Method::GET, ["products"]) => match list_params(&event) {
            Ok(params) => atoms::products::http::list_products(store, &params).await,
            Err(e) => Ok(responses::error_response(&e)),
        },
        // PATCH /products/{id}/active
        (&Method::PATCH, ["products", product_id, "active"]) => {
            atoms::products::http::set_active(store, product_id, body).await
        }
        // PATCH /products/{id}/stock
        (&Method::PATCH, ["products", product_id, "stock"]) => {
            atoms::products::http::set_stock(store, product_id, body).await
        }
        // DELETE /products/{id}
        (&Method::DELETE, ["products", product_id]) => {
            atoms::products::http::delete(store, product_id).await
        }

        // --- SELLER APPLICATIONS ---
        // GET /sellers?status=pending|approved|rejected
        (&Method::GET, ["sellers"]) => match list_params(&event) {
            Ok(params) => atoms::sellers::http::list_sellers(store, &params).await,
            Err(e) => Ok(responses::error_response(&e)),
        },
        // POST /sellers/reconcile - repair approved owners missing the seller role
        (&Method::POST, ["sellers", "reconcile"]) => {
            atoms::sellers::http::reconcile(store).await
        }
        // GET /sellers/{id}
        (&Method::GET, ["sellers", application_id]) => {
            atoms::sellers::http::get_seller(store, application_id).await
        }
        // POST /sellers/{id}/approve
        (&Method::POST, ["sellers", application_id, "approve"]) => {
            atoms::sellers::http::approve(store, application_id, body).await
        }
        // POST /sellers/{id}/reject
        (&Method::POST, ["sellers", application_id, "reject"]) => {
            atoms::sellers::http::reject(store, application_id, body).await
        }

        // --- DASHBOARD ---
        // GET /dashboard/stats - all metrics, or ?partial=true for whatever succeeded
        (&Method::GET, ["dashboard", "stats"]) => {
            if query_param(&event, "partial").as_deref() == Some("true") {
                responses::json(StatusCode::OK, &atoms::stats::collect_stats(store).await)
            } else {
                responses::respond(atoms::stats::compute_stats(store).await, StatusCode::OK)
            }
        }
        // GET /dashboard/activity - most recent entries
        (&Method::GET, ["dashboard", "activity"]) => responses::respond(
            atoms::activity::recent_activity(store, atoms::activity::RECENT_ACTIVITY_LIMIT).await,
            StatusCode::OK,
        ),

        _ => {
            tracing::warn!("No route matched - Method: {} Path: {}", method, path);
            responses::not_found()
        }
    };

    finalize_response(resp, &cors_origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use haul_atoms::store::{DocumentStore, InMemoryStore};
    use haul_shared::config::AppConfig;
    use haul_shared::identity::{
        AccountMetadata, Identity, IdentityError, IdentityProvider, SignIn,
    };
    use lambda_http::http;
    use serde_json::{json, Value};

    /// Every token is "token-<uid>".
    struct TokenIdentity;

    #[async_trait]
    impl IdentityProvider for TokenIdentity {
        async fn current_identity(&self, access_token: &str) -> Result<Identity, IdentityError> {
            access_token
                .strip_prefix("token-")
                .map(|uid| Identity {
                    uid: uid.to_string(),
                    email: None,
                })
                .ok_or(IdentityError::InvalidToken)
        }

        async fn sign_in(&self, _email: &str, _password: &str) -> Result<SignIn, IdentityError> {
            Err(IdentityError::InvalidCredentials)
        }

        async fn sign_out(&self, _access_token: &str) -> Result<(), IdentityError> {
            Ok(())
        }

        async fn account_metadata(&self, _user_id: &str) -> Result<AccountMetadata, IdentityError> {
            Ok(AccountMetadata::default())
        }
    }

    async fn state() -> Arc<AppState> {
        let store = InMemoryStore::new();
        let seed = [
            ("users", "boss", json!({"email": "boss@haul.ph", "roles": ["admin"]})),
            ("users", "u1", json!({"email": "owner@acme.ph", "roles": ["user"]})),
            (
                "sellers",
                "app1",
                json!({"userId": "u1", "businessName": "Acme", "status": "pending"}),
            ),
        ];
        for (collection, id, value) in seed {
            store
                .put(collection, id, value.as_object().cloned().unwrap())
                .await
                .unwrap();
        }
        let config = AppConfig::from_lookup(|key| match key {
            "COGNITO_CLIENT_ID" | "COGNITO_CLIENT_SECRET" | "COGNITO_USER_POOL_ID" => {
                Some("test".to_string())
            }
            "ALLOWED_ORIGINS" => Some("https://admin.haul.ph".to_string()),
            _ => None,
        })
        .unwrap();
        Arc::new(AppState::new(Arc::new(store), Arc::new(TokenIdentity), config))
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: &str) -> Request {
        let mut builder = http::Request::builder()
            .method(method)
            .uri(uri)
            .header("Origin", "https://admin.haul.ph");
        if let Some(token) = token {
            builder = builder.header("Cookie", format!("haul_access_token={}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn body_json(resp: &Response<Body>) -> Value {
        match resp.body() {
            Body::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn unauthenticated_requests_get_401_with_cors() {
        let resp = function_handler(request(Method::GET, "/products", None, ""), state().await)
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Origin").unwrap(),
            "https://admin.haul.ph"
        );
    }

    #[tokio::test]
    async fn non_admin_cannot_approve() {
        let resp = function_handler(
            request(
                Method::POST,
                "/sellers/app1/approve",
                Some("token-u1"),
                r#"{"userId": "u1"}"#,
            ),
            state().await,
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), 403);
    }

    #[tokio::test]
    async fn admin_approves_then_second_decision_conflicts() {
        let state = state().await;
        let resp = function_handler(
            request(
                Method::POST,
                "/sellers/app1/approve",
                Some("token-boss"),
                r#"{"userId": "u1"}"#,
            ),
            state.clone(),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), 200);
        let body = body_json(&resp);
        assert_eq!(body["application"]["status"], "approved");

        let again = function_handler(
            request(
                Method::POST,
                "/sellers/app1/reject",
                Some("token-boss"),
                r#"{"userId": "u1"}"#,
            ),
            state,
        )
        .await
        .unwrap();
        assert_eq!(again.status(), 409);
    }

    #[tokio::test]
    async fn callable_stats_denied_for_non_admin() {
        let resp = function_handler(
            request(Method::POST, "/callable/getDashboardStats", Some("token-u1"), "{}"),
            state().await,
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), 403);
        assert_eq!(body_json(&resp)["error"]["status"], "permission-denied");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let resp = function_handler(
            request(Method::GET, "/orders", Some("token-boss"), ""),
            state().await,
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), 404);
    }
}
