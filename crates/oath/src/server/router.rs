//! Axum router construction.

use axum::{routing::get, Router};
use common::ApiConfig;

use super::{handlers, middleware, state::AppState};
use crate::api::ApiRouter;

/// Build the application [`Router`]: status routes, the versioned API mounted
/// by `api`, the 404 fallback, all wrapped in the instrumentation chain.
pub fn build<A>(state: AppState, cors_origins: &[String], api: &A, api_cfg: &ApiConfig) -> Router
where
    A: ApiRouter + ?Sized,
{
    let version = state.version.clone();

    let status = Router::new()
        .route("/", get(handlers::index))
        .route("/version", get(handlers::version))
        .with_state(state);

    let app = api.mount(status, api_cfg).fallback(handlers::not_found);

    middleware::instrument(app, &version, cors_origins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1::V1;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use common::KeyPair;
    use tower::ServiceExt;

    fn api_cfg() -> ApiConfig {
        ApiConfig {
            key_pair: KeyPair {
                private_key_path: "/nonexistent/private.key".into(),
                public_key_path: "/nonexistent/public.key".into(),
            },
            aws_region: "ap-northeast-1".into(),
        }
    }

    fn app() -> Router {
        build(AppState::new("0.1.0"), &[], &V1, &api_cfg())
    }

    async fn call(uri: &str) -> axum::response::Response {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app().oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn index_route_exists() {
        let resp = call("/").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], handlers::COPYRIGHT.as_bytes());
    }

    #[tokio::test]
    async fn version_route_exists() {
        let resp = call("/version").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"0.1.0");
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let resp = call("/unknown").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn server_header_on_every_route_and_status() {
        // The API route answers 503 here: the key files do not exist.
        for (uri, status) in [
            ("/", StatusCode::OK),
            ("/version", StatusCode::OK),
            ("/unknown", StatusCode::NOT_FOUND),
            ("/api/v1/public_key", StatusCode::SERVICE_UNAVAILABLE),
        ] {
            let resp = call(uri).await;
            assert_eq!(resp.status(), status, "{uri}");
            assert_eq!(resp.headers()[header::SERVER], "mobingi:oath:0.1.0", "{uri}");
        }
    }
}
