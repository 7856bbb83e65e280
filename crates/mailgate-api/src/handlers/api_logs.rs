//! Admin listing of external API call records

use axum::extract::State;
use axum::response::Response;
use axum::Extension;
use mailgate_storage::repository::ApiLogFilter;
use serde::Deserialize;
use serde_json::json;

use crate::envelope::{error_response, ok_response, RequestId};
use crate::params::Params;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LogListParams {
    pub action: Option<String>,
    pub api_key_id: Option<i64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// `GET /admin/logs`
pub async fn list(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Params(params): Params<LogListParams>,
) -> Response {
    let filter = ApiLogFilter {
        action: params.action.filter(|a| !a.is_empty()),
        api_key_id: params.api_key_id,
        page: params.page.unwrap_or(1),
        per_page: params.limit.unwrap_or(50),
    };

    match state.api_logs.list(&filter).await {
        Ok((logs, total)) => ok_response(
            &request_id.0,
            json!({
                "total": total,
                "page": filter.page.max(1),
                "logs": logs,
            }),
        ),
        Err(e) => error_response(&request_id.0, &e),
    }
}
