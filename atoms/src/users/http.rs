use super::model::{SetDisabledPayload, SetEmailVerifiedPayload, SetRolesPayload, User};
use super::service;
use crate::http::{parse_body, respond, ListParams, ListingResponse};
use crate::listing::{list_page, PageRequest};
use crate::store::DocumentStore;
use crate::AdminError;
use lambda_http::{http::StatusCode, Body, Error, Response};

/// GET /users - one page ordered by email, narrowed by search and role.
pub async fn list_users(
    store: &dyn DocumentStore,
    params: &ListParams,
) -> Result<Response<Body>, Error> {
    let filter = match params.filters.user_filter() {
        Ok(filter) => filter,
        Err(e) => return respond::<()>(Err(AdminError::InvalidRequest(e)), StatusCode::OK),
    };
    let request = PageRequest::new(params.page_size).after(params.after.clone());
    let page = list_page::<User>(store, &request)
        .await
        .map(|page| ListingResponse::new(page, &filter));
    respond(page, StatusCode::OK)
}

/// PATCH /users/{id}/disabled
pub async fn set_disabled(
    store: &dyn DocumentStore,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let result = match parse_body::<SetDisabledPayload>(body) {
        Ok(req) => service::set_user_disabled(store, user_id, req.disabled).await,
        Err(e) => Err(e),
    };
    respond(result, StatusCode::OK)
}

/// PATCH /users/{id}/email-verified
pub async fn set_email_verified(
    store: &dyn DocumentStore,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let result = match parse_body::<SetEmailVerifiedPayload>(body) {
        Ok(req) => service::set_user_email_verified(store, user_id, req.email_verified).await,
        Err(e) => Err(e),
    };
    respond(result, StatusCode::OK)
}

/// PUT /users/{id}/roles - unknown role tags are rejected before any write.
pub async fn set_roles(
    store: &dyn DocumentStore,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let roles = parse_body::<SetRolesPayload>(body).and_then(|req| service::parse_roles(&req.roles));
    let result = match roles {
        Ok(roles) => service::set_user_roles(store, user_id, roles).await,
        Err(e) => Err(e),
    };
    respond(result, StatusCode::OK)
}
