//! Unified parameter extraction
//!
//! External endpoints accept both GET (query string) and POST (JSON body).
//! `Params<T>` hides the difference: GET and bodyless POSTs deserialize
//! from the query string, everything else from the JSON body.

use axum::extract::{FromRequest, Query, Request};
use axum::http::Method;
use axum::Json;
use mailgate_common::Error;
use serde::de::DeserializeOwned;

use crate::envelope::{error_response, RequestId};

/// Query-or-JSON parameter extractor
pub struct Params<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for Params<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = axum::response::Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = req
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_default();

        if req.method() == Method::GET {
            let query = req.uri().query().unwrap_or("");
            return serde_urlencoded_parse(query)
                .map(Params)
                .map_err(|message| {
                    error_response(&request_id, &Error::Validation(message))
                });
        }

        // Empty POST bodies fall back to the query string as well
        let has_body = req
            .headers()
            .get(axum::http::header::CONTENT_LENGTH)
            .and_then(|len| len.to_str().ok())
            .and_then(|len| len.parse::<u64>().ok())
            .map(|len| len > 0)
            .unwrap_or(false);
        if !has_body {
            let query = req.uri().query().unwrap_or("").to_string();
            return serde_urlencoded_parse(&query)
                .map(Params)
                .map_err(|message| {
                    error_response(&request_id, &Error::Validation(message))
                });
        }

        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Params(value)),
            Err(rejection) => Err(error_response(
                &request_id,
                &Error::Validation(format!("Invalid JSON body: {}", rejection.body_text())),
            )),
        }
    }
}

fn serde_urlencoded_parse<T: DeserializeOwned>(query: &str) -> Result<T, String> {
    Query::<T>::try_from_uri(
        &format!("http://localhost/?{}", query)
            .parse()
            .map_err(|_| "Invalid query string".to_string())?,
    )
    .map(|Query(value)| value)
    .map_err(|e| format!("Invalid query parameters: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        email: Option<String>,
        group: Option<String>,
    }

    #[test]
    fn parses_query_strings() {
        let sample: Sample = serde_urlencoded_parse("email=a%40x&group=g1").unwrap();
        assert_eq!(sample.email.as_deref(), Some("a@x"));
        assert_eq!(sample.group.as_deref(), Some("g1"));
    }

    #[test]
    fn empty_query_yields_defaults() {
        let sample: Sample = serde_urlencoded_parse("").unwrap();
        assert_eq!(sample, Sample::default());
    }
}
