use super::model::{Product, SetActivePayload, SetStockPayload};
use super::service;
use crate::http::{parse_body, respond, ListParams, ListingResponse};
use crate::listing::{list_page, PageRequest};
use crate::store::DocumentStore;
use crate::AdminError;
use lambda_http::{http::StatusCode, Body, Error, Response};

/// GET /products - newest first, narrowed by search, category and stock status.
pub async fn list_products(
    store: &dyn DocumentStore,
    params: &ListParams,
) -> Result<Response<Body>, Error> {
    let filter = match params.filters.product_filter() {
        Ok(filter) => filter,
        Err(e) => return respond::<()>(Err(AdminError::InvalidRequest(e)), StatusCode::OK),
    };
    let request = PageRequest::new(params.page_size).after(params.after.clone());
    let page = list_page::<Product>(store, &request)
        .await
        .map(|page| ListingResponse::new(page, &filter));
    respond(page, StatusCode::OK)
}

/// PATCH /products/{id}/active
pub async fn set_active(
    store: &dyn DocumentStore,
    product_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let result = match parse_body::<SetActivePayload>(body) {
        Ok(req) => service::set_product_active(store, product_id, req.is_active).await,
        Err(e) => Err(e),
    };
    respond(result, StatusCode::OK)
}

/// PATCH /products/{id}/stock
pub async fn set_stock(
    store: &dyn DocumentStore,
    product_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let result = match parse_body::<SetStockPayload>(body) {
        Ok(req) => service::set_product_stock(store, product_id, req.current_stock).await,
        Err(e) => Err(e),
    };
    respond(result, StatusCode::OK)
}

/// DELETE /products/{id}
pub async fn delete(store: &dyn DocumentStore, product_id: &str) -> Result<Response<Body>, Error> {
    respond(service::delete_product(store, product_id).await, StatusCode::OK)
}
