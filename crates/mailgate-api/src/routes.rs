//! API routes

use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post, put};
use axum::{middleware, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{
    admin_auth_middleware, api_key_middleware, api_log_middleware, request_id_middleware,
};
use crate::handlers::{
    admin_auth, admins, api_keys, api_logs, dashboard, email_accounts, external, groups, health,
    pool_admin,
};
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    // External endpoints accept both GET (query) and POST (JSON body)
    let external_routes: Router<AppState> = Router::new()
        .route("/get-email", get(external::get_email).post(external::get_email))
        .route("/mail_new", get(external::mail_new).post(external::mail_new))
        .route("/mail_text", get(external::mail_text).post(external::mail_text))
        .route("/mail_all", get(external::mail_all).post(external::mail_all))
        .route(
            "/process-mailbox",
            get(external::process_mailbox).post(external::process_mailbox),
        )
        .route(
            "/list-emails",
            get(external::list_emails).post(external::list_emails),
        )
        .route("/pool-stats", get(external::pool_stats).post(external::pool_stats))
        .route("/reset-pool", get(external::reset_pool).post(external::reset_pool));
    let external_routes: Router<AppState> = external_routes.layer(
        middleware::from_fn_with_state::<_, _, (axum::extract::State<AppState>, axum::extract::Request)>(
            state.clone(),
            api_key_middleware,
        ),
    );
    let external_routes: Router<AppState> = external_routes.layer(
        middleware::from_fn_with_state::<_, _, (axum::extract::State<AppState>, axum::extract::Request)>(
            state.clone(),
            api_log_middleware,
        ),
    );

    // Admin routes behind the session-token check
    let admin_protected: Router<AppState> = Router::new()
        .route("/auth/logout", post(admin_auth::logout))
        .route("/auth/profile", get(admin_auth::profile))
        .route("/auth/2fa/setup", post(admin_auth::twofa_setup))
        .route("/auth/2fa/enable", post(admin_auth::twofa_enable))
        .route("/auth/2fa/disable", post(admin_auth::twofa_disable))
        .route("/api-keys", get(api_keys::list).post(api_keys::create))
        .route("/api-keys/:id", get(api_keys::get))
        .route("/api-keys/:id", put(api_keys::update))
        .route("/api-keys/:id", delete(api_keys::delete))
        .route("/api-keys/:id/pool", get(pool_admin::get))
        .route("/api-keys/:id/pool", put(pool_admin::replace))
        .route(
            "/email-accounts",
            get(email_accounts::list).post(email_accounts::create),
        )
        .route("/email-accounts/:id", get(email_accounts::get))
        .route("/email-accounts/:id", put(email_accounts::update))
        .route("/email-accounts/:id", delete(email_accounts::delete))
        .route("/groups", get(groups::list).post(groups::create))
        .route("/groups/:id", put(groups::update))
        .route("/groups/:id", delete(groups::delete))
        .route("/admins", get(admins::list).post(admins::create))
        .route("/admins/:id", put(admins::update))
        .route("/admins/:id", delete(admins::delete))
        .route("/dashboard/stats", get(dashboard::stats))
        .route("/logs", get(api_logs::list))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/auth/login", post(admin_auth::login))
        .merge(admin_protected);

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", external_routes)
        .nest("/admin", admin_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors_layer(&state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    if state.config.cors_origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}
