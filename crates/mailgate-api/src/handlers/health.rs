//! Health check handler

use axum::response::Response;
use axum::Extension;
use serde_json::json;

use crate::envelope::{ok_response, RequestId};

pub async fn health(Extension(request_id): Extension<RequestId>) -> Response {
    ok_response(&request_id.0, json!({ "status": "ok" }))
}
