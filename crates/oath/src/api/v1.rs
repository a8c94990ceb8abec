//! `/api/v1` routes.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use common::{ApiConfig, ErrorResponse, ServiceError};
use tracing::warn;

use super::ApiRouter;
use crate::server::context::RequestContext;

/// Mount point of the v1 routes.
pub const PREFIX: &str = "/api/v1";

/// Content type of the served public key.
pub const PEM_CONTENT_TYPE: &str = "application/x-pem-file";

/// Version 1 of the token API.
#[derive(Debug, Clone, Copy, Default)]
pub struct V1;

impl ApiRouter for V1 {
    fn mount(&self, router: Router, cfg: &ApiConfig) -> Router {
        let v1 = Router::new()
            .route("/public_key", get(public_key))
            .with_state(Arc::new(cfg.clone()));
        router.nest(PREFIX, v1)
    }
}

/// `GET /api/v1/public_key`: PEM public key token verifiers need.
///
/// The file is read per request; 503 if it has gone missing since startup.
async fn public_key(
    State(cfg): State<Arc<ApiConfig>>,
    ctx: Option<Extension<RequestContext>>,
) -> Response {
    let path = &cfg.key_pair.public_key_path;
    let resp = match tokio::fs::read(path).await {
        Ok(pem) => ([(header::CONTENT_TYPE, PEM_CONTENT_TYPE)], pem).into_response(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "public key unreadable");
            let err = ServiceError::Unavailable("public key unavailable".into());
            let status = StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(ErrorResponse::from(&err))).into_response()
        }
    };

    if let Some(Extension(ctx)) = ctx {
        ctx.log_elapsed();
    }
    resp
}
