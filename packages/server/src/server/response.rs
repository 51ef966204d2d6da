//! JSON envelope shared by every endpoint
//!
//! `{"result": true, "data": ..., "errors": []}` on success,
//! `{"result": false, "data": null, "errors": [...], "message": "..."}` on failure.

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};

use crate::common::FieldErrors;
use crate::domains::confirmation::FlowError;

pub const BODY_FIELD: &str = "body";
pub const INVALID_BODY_MESSAGE: &str = "request body is not valid JSON of the expected shape";

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub result: bool,
    pub data: Option<T>,
    pub errors: FieldErrors,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            result: true,
            data: Some(data),
            errors: FieldErrors::new(),
            message: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = if self.result {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        };
        (status, Json(self)).into_response()
    }
}

/// Success envelope around `data`
pub fn ok<T: Serialize>(data: T) -> Response {
    ApiResponse::ok(data).into_response()
}

/// `Json<T>` whose rejections come back in the error envelope
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = FlowError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                debug!(reason = %rejection.body_text(), "request body rejected");
                Err(FlowError::field(BODY_FIELD, INVALID_BODY_MESSAGE))
            }
        }
    }
}

impl IntoResponse for FlowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_internal() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, status = %status, "request rejected");
        }

        let view = self.public_view();
        let body = ApiResponse::<()> {
            result: false,
            data: None,
            errors: view.fields,
            message: Some(view.message),
        };
        (status, Json(body)).into_response()
    }
}
