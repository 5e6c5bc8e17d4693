use super::model::{ApplicationStatus, DecisionPayload};
use super::service;
use crate::http::{parse_body, respond, ListParams, ListingResponse};
use crate::store::DocumentStore;
use crate::AdminError;
use lambda_http::{http::StatusCode, Body, Error, Response};

/// GET /sellers - pending applications unless `status` names another one; `all` lists every status.
pub async fn list_sellers(
    store: &dyn DocumentStore,
    params: &ListParams,
) -> Result<Response<Body>, Error> {
    let filter = match params.filters.seller_filter() {
        Ok(filter) => filter,
        Err(e) => return respond::<()>(Err(AdminError::InvalidRequest(e)), StatusCode::OK),
    };
    let status = match params.filters.status.as_deref().map(str::trim) {
        None | Some("") => Some(ApplicationStatus::Pending),
        Some(_) => filter.status,
    };
    let page = service::list_applications(store, status, params.page_size, params.after.clone())
        .await
        .map(|page| ListingResponse::new(page, &filter));
    respond(page, StatusCode::OK)
}

/// GET /sellers/{id}
pub async fn get_seller(
    store: &dyn DocumentStore,
    application_id: &str,
) -> Result<Response<Body>, Error> {
    respond(service::get_application(store, application_id).await, StatusCode::OK)
}

/// POST /sellers/{id}/approve
pub async fn approve(
    store: &dyn DocumentStore,
    application_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let result = match parse_body::<DecisionPayload>(body) {
        Ok(req) => service::approve(store, application_id, &req.user_id).await,
        Err(e) => Err(e),
    };
    respond(result, StatusCode::OK)
}

/// POST /sellers/{id}/reject
pub async fn reject(
    store: &dyn DocumentStore,
    application_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let result = match parse_body::<DecisionPayload>(body) {
        Ok(req) => service::reject(store, application_id, &req.user_id).await,
        Err(e) => Err(e),
    };
    respond(result, StatusCode::OK)
}

/// POST /sellers/reconcile
pub async fn reconcile(store: &dyn DocumentStore) -> Result<Response<Body>, Error> {
    respond(service::reconcile_approved_sellers(store).await, StatusCode::OK)
}
