//! JSON response envelope and request-id plumbing
//!
//! Every JSON response has the shape
//! `{success, data?, error?{code, message, details?}, requestId?}` and
//! carries an `x-request-id` header. `/api/mail_text` is the one plain-text
//! exception and renders through `plain_ok` / `plain_error`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use mailgate_common::Error;
use serde::Serialize;
use serde_json::json;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id attached to extensions by the request-id middleware
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Mailbox id a handler wants recorded in the api log, attached to the
/// response extensions.
#[derive(Debug, Clone, Copy)]
pub struct LoggedMailbox(pub i64);

fn with_request_id_header(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Successful JSON envelope
pub fn ok_response(request_id: &str, data: impl Serialize) -> Response {
    let body = json!({
        "success": true,
        "data": data,
        "requestId": request_id,
    });
    with_request_id_header(Json(body).into_response(), request_id)
}

/// Error JSON envelope with the error's HTTP status
pub fn error_response(request_id: &str, err: &Error) -> Response {
    let details = err.details().map(|details| {
        details
            .iter()
            .map(|(path, message)| json!({"path": path, "message": message}))
            .collect::<Vec<_>>()
    });
    let body = json!({
        "success": false,
        "error": {
            "code": err.code(),
            "message": err.to_string(),
            "details": details,
        },
        "requestId": request_id,
    });
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    with_request_id_header((status, Json(body)).into_response(), request_id)
}

/// Plain-text success for `/api/mail_text`
pub fn plain_ok(request_id: &str, body: String) -> Response {
    let response = (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response();
    with_request_id_header(response, request_id)
}

/// Plain-text error for `/api/mail_text`: `Error: {message}`
pub fn plain_error(request_id: &str, err: &Error) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let response = (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("Error: {}", err),
    )
        .into_response();
    with_request_id_header(response, request_id)
}

/// Tag a response with the mailbox it touched, for the api log
pub fn with_mailbox(mut response: Response, account_id: i64) -> Response {
    response.extensions_mut().insert(LoggedMailbox(account_id));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn ok_envelope_shape() {
        let response = ok_response("req-1", json!({"email": "a@x", "id": 1}));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER).unwrap(),
            "req-1"
        );
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["email"], "a@x");
        assert_eq!(body["requestId"], "req-1");
    }

    #[tokio::test]
    async fn error_envelope_shape() {
        let response = error_response("req-2", &Error::RateLimitExceeded);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["requestId"], "req-2");
    }

    #[tokio::test]
    async fn validation_details_are_listed() {
        let err = Error::ValidationDetails(vec![("PORT".into(), "bad".into())]);
        let body = body_json(error_response("r", &err)).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["details"][0]["path"], "PORT");
    }

    #[tokio::test]
    async fn plain_text_error_format() {
        let response = plain_error("r", &Error::EmailNotFound("a@x".into()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("Error: "));
    }
}
