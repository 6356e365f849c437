use axum::body::HttpBody;
use axum::extract::{MatchedPath, Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use statshub_core::RequestOutcome;

use crate::exporters::{JsonExporter, TEXT_CONTENT_TYPE};
use crate::hub::MetricsHub;

/// Middleware recording one outcome per request against the matched route
/// template, or the raw path when no route matched.
pub async fn track_metrics(State(hub): State<Arc<MetricsHub>>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let request_bytes = content_length(req.headers()).unwrap_or(0);

    let response = next.run(req).await;

    let response_bytes = response
        .body()
        .size_hint()
        .exact()
        .or_else(|| content_length(response.headers()))
        .unwrap_or(0);
    let outcome = RequestOutcome::new(response.status().as_u16(), start.elapsed())
        .with_sizes(request_bytes, response_bytes);
    hub.update_http_request_metrics(&method, &path, &outcome);

    response
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Wrap every route of `router` with [`track_metrics`].
pub fn instrument<S>(router: Router<S>, hub: Arc<MetricsHub>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(hub, track_metrics))
}

/// Text exposition on the configured metrics path and route snapshots as
/// JSON under `<metrics_path>/snapshots`.
pub fn metrics_router(hub: Arc<MetricsHub>) -> Router {
    let path = hub.config().server.metrics_path.clone();
    let snapshots_path = format!("{}/snapshots", path.trim_end_matches('/'));

    Router::new()
        .route(&path, get(render_metrics))
        .route(&snapshots_path, get(render_snapshots))
        .with_state(hub)
}

async fn render_metrics(State(hub): State<Arc<MetricsHub>>) -> Response {
    match hub.render() {
        Ok(body) => ([(CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            warn!("Failed to render metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn render_snapshots(State(hub): State<Arc<MetricsHub>>) -> Response {
    let snapshots = hub.snapshots();
    Json(JsonExporter::keyed(&snapshots)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::routing::post;
    use statshub_config::HubConfig;
    use tower::ServiceExt;

    fn hub() -> Arc<MetricsHub> {
        let config = HubConfig::builder()
            .service_name("orders")
            .exclude_path("/health")
            .build();
        Arc::new(MetricsHub::new(config).unwrap())
    }

    fn app(hub: Arc<MetricsHub>) -> Router {
        let routes = Router::new()
            .route("/orders/:id", get(|| async { "order" }))
            .route("/orders", post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "bad") }))
            .route("/health", get(|| async { "ok" }));
        instrument(routes, Arc::clone(&hub)).merge(metrics_router(hub))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: &'static str) -> Response {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_middleware_records_route_templates() {
        let hub = hub();
        let app = app(Arc::clone(&hub));

        call(&app, "GET", "/orders/1", "").await;
        call(&app, "GET", "/orders/2", "").await;
        let rejected = call(&app, "POST", "/orders", "{\"sku\":1}").await;
        assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
        call(&app, "GET", "/health", "").await;

        assert_eq!(hub.tick(), 2);
        let snapshots = hub.snapshots();

        let get = &snapshots[&statshub_core::RouteKey::new("GET", "/orders/:id")];
        assert_eq!(get.count, 2);
        assert_eq!(get.resp_size, 10);

        let post = &snapshots[&statshub_core::RouteKey::new("POST", "/orders")];
        assert_eq!(post.err_count, 1);
        assert_eq!(post.req_size, 9);
        assert_eq!(post.codes.get(&422), Some(&1));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let hub = hub();
        let app = app(Arc::clone(&hub));
        call(&app, "GET", "/orders/1", "").await;

        let response = call(&app, "GET", "/metrics", "").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            TEXT_CONTENT_TYPE
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("service_total_requests"));
        assert!(text.contains("path=\"/orders/:id\""));
    }

    #[tokio::test]
    async fn test_snapshots_endpoint() {
        let hub = hub();
        let app = app(Arc::clone(&hub));
        call(&app, "GET", "/orders/1", "").await;
        hub.tick();

        let response = call(&app, "GET", "/metrics/snapshots", "").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["GET /orders/:id"]["count"], 1);
    }
}
