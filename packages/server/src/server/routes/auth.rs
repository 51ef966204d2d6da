//! Auth endpoints. Handlers only decode the request and wrap the action result.

use axum::{extract::Extension, http::HeaderMap, response::Response};

use crate::domains::auth::actions::{self, SigninRequest};
use crate::domains::confirmation::{FinishRequest, FlowError, StartRequest, VerifyRequest};
use crate::server::app::AppState;
use crate::server::middleware::{extract_token, unauthorized, AuthUser};
use crate::server::response::{ok, JsonBody};

fn respond<T: serde::Serialize>(result: Result<T, FlowError>) -> Response {
    match result {
        Ok(data) => ok(data),
        Err(e) => axum::response::IntoResponse::into_response(e),
    }
}

pub async fn signin_handler(
    Extension(state): Extension<AppState>,
    JsonBody(request): JsonBody<SigninRequest>,
) -> Response {
    respond(actions::signin(&request, &state.deps).await)
}

/// Not behind the session middleware: signing out a dead session succeeds.
pub async fn signout_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = extract_token(&headers, &state.deps.auth.token_name) else {
        return unauthorized();
    };
    respond(actions::signout(&token, &state.deps).await)
}

pub async fn refresh_handler(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    respond(actions::refresh(&user.token, &state.deps).await)
}

pub async fn check_handler(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    respond(actions::check(&user.token, &state.deps).await)
}

pub async fn signup_start_handler(
    Extension(state): Extension<AppState>,
    JsonBody(request): JsonBody<StartRequest>,
) -> Response {
    respond(state.flows.signup.start(&request).await)
}

pub async fn signup_verify_handler(
    Extension(state): Extension<AppState>,
    JsonBody(request): JsonBody<VerifyRequest>,
) -> Response {
    respond(state.flows.signup.verify(&request).await)
}

pub async fn signup_finish_handler(
    Extension(state): Extension<AppState>,
    JsonBody(request): JsonBody<FinishRequest>,
) -> Response {
    respond(state.flows.signup.finish(&request).await)
}

pub async fn recovery_start_handler(
    Extension(state): Extension<AppState>,
    JsonBody(request): JsonBody<StartRequest>,
) -> Response {
    respond(state.flows.recovery.start(&request).await)
}

pub async fn recovery_verify_handler(
    Extension(state): Extension<AppState>,
    JsonBody(request): JsonBody<VerifyRequest>,
) -> Response {
    respond(state.flows.recovery.verify(&request).await)
}

pub async fn recovery_finish_handler(
    Extension(state): Extension<AppState>,
    JsonBody(request): JsonBody<FinishRequest>,
) -> Response {
    respond(state.flows.recovery.finish(&request).await)
}
