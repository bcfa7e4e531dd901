//! Router construction for the passgate server.

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::{
    middleware as axum_mw,
    routing::{get, patch, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::gate::require_admission;
use crate::middleware::session::require_session;
use crate::realtime::ws_handler;
use crate::selection::SELECTED_IDENTITY_HEADER;
use crate::state::AppState;

/// Build the full axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Session + gate: the selected identity must be admitted
    let gated = Router::new()
        .route("/access", get(handlers::access::current_access))
        .route(
            "/admin/users",
            get(handlers::admin::list_users).post(handlers::admin::create_user),
        )
        .route("/admin/users/:id", patch(handlers::admin::update_user))
        .route("/admin/passes", post(handlers::admin::issue_pass))
        .route(
            "/admin/passes/:id/revoke",
            patch(handlers::admin::revoke_pass),
        )
        .route(
            "/master-settings",
            get(handlers::master_settings::get_settings)
                .put(handlers::master_settings::update_settings),
        )
        .layer(axum_mw::from_fn(require_admission));

    // Session only. The realtime channel gates each event itself.
    let session = Router::new()
        .route("/users/active", get(handlers::users::active_users))
        .route("/ws", get(ws_handler))
        .merge(gated)
        .layer(axum_mw::from_fn(require_session));

    // Public routes (no auth)
    let public = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/auth/login", post(handlers::auth::login));

    let cors = cors_layer(state.config.client_url.as_deref());

    public
        .merge(session)
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(client_url: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(SELECTED_IDENTITY_HEADER),
        ]);
    match client_url.and_then(|url| HeaderValue::from_str(url).ok()) {
        // Cookies only travel cross-origin to an explicit origin.
        Some(origin) => base.allow_origin(origin).allow_credentials(true),
        None => base.allow_origin(Any),
    }
}
