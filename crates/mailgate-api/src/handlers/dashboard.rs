//! Admin dashboard statistics

use axum::extract::State;
use axum::response::Response;
use axum::Extension;
use chrono::{Duration, Utc};
use mailgate_common::types::AccountStatus;
use mailgate_common::Error;
use serde_json::json;

use crate::envelope::{error_response, ok_response, RequestId};
use crate::state::AppState;

/// `GET /admin/dashboard/stats`
pub async fn stats(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Response {
    let result = async {
        let now = Utc::now();
        let api_keys = state.api_keys.count().await?;
        let accounts = state.accounts.count().await?;
        let active_accounts = state.accounts.count_by_status(AccountStatus::Active).await?;
        let error_accounts = state.accounts.count_by_status(AccountStatus::Error).await?;
        let groups = state.groups.list().await?.len();
        let calls_24h = state.api_logs.count_since(now - Duration::hours(24)).await?;
        let calls_7d = state.api_logs.count_since(now - Duration::days(7)).await?;

        Ok::<_, Error>(json!({
            "apiKeys": api_keys,
            "emailAccounts": accounts,
            "activeAccounts": active_accounts,
            "errorAccounts": error_accounts,
            "groups": groups,
            "apiCallsLast24h": calls_24h,
            "apiCallsLast7d": calls_7d,
            "generatedAt": now,
        }))
    }
    .await;

    match result {
        Ok(data) => ok_response(&request_id.0, data),
        Err(e) => error_response(&request_id.0, &e),
    }
}
