//! Axum request handlers for the status endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::{ErrorResponse, ServiceError};

use super::state::AppState;

/// Body of `GET /`.
pub const COPYRIGHT: &str = "Copyright (c) Mobingi, 2015-2017. All rights reserved.";

/// `GET /`: copyright notice.
pub async fn index() -> &'static str {
    COPYRIGHT
}

/// `GET /version`: service version.
pub async fn version(State(state): State<AppState>) -> String {
    state.version.as_str().to_owned()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ServiceError::NotFound("the requested resource does not exist".into());
    (StatusCode::NOT_FOUND, Json(ErrorResponse::from(&err)))
}
