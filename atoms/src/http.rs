//! JSON response helpers shared by every route.
use crate::error::{AdminError, AdminResult};
use crate::filters::{EntityFilter, FilterParams};
use crate::listing::{Page, DEFAULT_PAGE_SIZE};
use lambda_http::http::header::{HeaderValue, CONTENT_TYPE};
use lambda_http::http::StatusCode;
use lambda_http::{Body, Error, Response};
use serde::Serialize;

pub fn status_for(error: &AdminError) -> StatusCode {
    match error {
        AdminError::Unauthenticated => StatusCode::UNAUTHORIZED,
        AdminError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        AdminError::NotFound(_) => StatusCode::NOT_FOUND,
        AdminError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        AdminError::InvalidTransition { .. } => StatusCode::CONFLICT,
        AdminError::QueryFailed { .. }
        | AdminError::WorkflowFailed(_)
        | AdminError::MutationFailed { .. }
        | AdminError::StatsFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON body with an explicit status. Never fails, so guards can return it directly.
pub fn json_with_status(status: StatusCode, body: serde_json::Value) -> Response<Body> {
    let mut resp = Response::new(Body::from(body.to_string()));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

pub fn error_response(error: &AdminError) -> Response<Body> {
    json_with_status(
        status_for(error),
        serde_json::json!({
            "error": error.code(),
            "message": error.to_string(),
        }),
    )
}

pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(serde_json::to_string(value)?.into())
        .map_err(Box::new)?)
}

/// Success as JSON with `status`; failures become their mapped error response.
pub fn respond<T: Serialize>(
    result: AdminResult<T>,
    status: StatusCode,
) -> Result<Response<Body>, Error> {
    match result {
        Ok(value) => json(status, &value),
        Err(e) => {
            if status_for(&e).is_server_error() {
                tracing::error!("Request failed: {}", e);
            } else {
                tracing::warn!("Request rejected: {}", e);
            }
            Ok(error_response(&e))
        }
    }
}

pub fn not_found() -> Result<Response<Body>, Error> {
    Ok(json_with_status(
        StatusCode::NOT_FOUND,
        serde_json::json!({"error": "Not found"}),
    ))
}

pub fn method_not_allowed() -> Result<Response<Body>, Error> {
    Ok(json_with_status(
        StatusCode::METHOD_NOT_ALLOWED,
        serde_json::json!({"error": "Method not allowed"}),
    ))
}

/// Parse a JSON request body, answering 400 on malformed input.
pub fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> AdminResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| AdminError::InvalidRequest(format!("malformed request body: {}", e)))
}

/// Paging and filter query parameters for listing routes.
#[derive(Debug, Default)]
pub struct ListParams {
    pub page_size: usize,
    pub after: Option<String>,
    pub filters: FilterParams,
}

impl ListParams {
    pub fn from_query(get: impl Fn(&str) -> Option<String>) -> AdminResult<Self> {
        let page_size = match get("page_size") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                AdminError::InvalidRequest(format!("page_size must be a positive integer, got {}", raw))
            })?,
            None => DEFAULT_PAGE_SIZE,
        };
        Ok(Self {
            page_size,
            after: get("after").filter(|a| !a.is_empty()),
            filters: FilterParams {
                search: get("search"),
                category: get("category"),
                status: get("status"),
                role: get("role"),
            },
        })
    }
}

/// A loaded page narrowed by the page-local filters.
#[derive(Debug, Serialize)]
pub struct ListingResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub total_count: u64,
    /// Items on the page before filtering.
    pub unfiltered_count: usize,
}

impl<T> ListingResponse<T> {
    pub fn new<F: EntityFilter<T>>(page: Page<T>, filter: &F) -> Self {
        let unfiltered_count = page.items.len();
        Self {
            items: page
                .items
                .into_iter()
                .filter(|item| filter.matches(item))
                .collect(),
            next_cursor: page.next_cursor,
            total_count: page.total_count,
            unfiltered_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sellers::ApplicationStatus;
    use crate::store::StoreError;

    #[test]
    fn errors_map_to_http_statuses() {
        assert_eq!(status_for(&AdminError::Unauthenticated), 401);
        assert_eq!(status_for(&AdminError::PermissionDenied("x".into())), 403);
        assert_eq!(
            status_for(&AdminError::InvalidTransition {
                from: ApplicationStatus::Approved,
                to: ApplicationStatus::Rejected,
            }),
            409
        );
        assert_eq!(
            status_for(&AdminError::WorkflowFailed(StoreError::Unavailable("db".into()))),
            500
        );
    }

    #[test]
    fn error_body_carries_code_and_message() {
        let resp = error_response(&AdminError::NotFound("product p1".into()));
        assert_eq!(resp.status(), 404);
        let body: serde_json::Value = match resp.body() {
            Body::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("unexpected body {:?}", other),
        };
        assert_eq!(body["error"], "NotFound");
        assert_eq!(body["message"], "product p1 not found");
    }

    #[test]
    fn list_params_default_and_reject_bad_page_size() {
        let params = ListParams::from_query(|key| match key {
            "after" => Some("p9".to_string()),
            "status" => Some("outofstock".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(params.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(params.after.as_deref(), Some("p9"));
        assert_eq!(params.filters.status.as_deref(), Some("outofstock"));

        let bad = ListParams::from_query(|key| (key == "page_size").then(|| "ten".to_string()));
        assert!(matches!(bad, Err(AdminError::InvalidRequest(_))));
    }
}
