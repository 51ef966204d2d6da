//! Application setup and router.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domains::auth::AuthFlows;
use crate::kernel::ServerDeps;
use crate::server::middleware::session_auth_middleware;
use crate::server::routes::{
    check_handler, health_handler, recovery_finish_handler, recovery_start_handler,
    recovery_verify_handler, refresh_handler, signin_handler, signout_handler,
    signup_finish_handler, signup_start_handler, signup_verify_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
    pub flows: Arc<AuthFlows>,
}

impl AppState {
    pub fn new(deps: ServerDeps) -> Self {
        let flows = Arc::new(AuthFlows::new(&deps));
        Self {
            deps: Arc::new(deps),
            flows,
        }
    }
}

/// Build the Axum application router
pub fn build_app(deps: ServerDeps) -> Router {
    let state = AppState::new(deps);
    let deps_for_middleware = state.deps.clone();

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    // Routes that need a live session
    let session_routes = Router::new()
        .route("/auth/refresh_token", get(refresh_handler))
        .route("/auth/check", get(check_handler))
        .route_layer(middleware::from_fn(move |req, next| {
            session_auth_middleware(deps_for_middleware.clone(), req, next)
        }));

    Router::new()
        .route("/auth/signin", post(signin_handler))
        .route("/auth/signout", post(signout_handler))
        .route("/auth/signup/start", post(signup_start_handler))
        .route("/auth/signup/verify", post(signup_verify_handler))
        .route("/auth/signup/finish", put(signup_finish_handler))
        .route("/auth/recovery/start", post(recovery_start_handler))
        .route("/auth/recovery/verify", post(recovery_verify_handler))
        .route("/auth/recovery/finish", put(recovery_finish_handler))
        .merge(session_routes)
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
