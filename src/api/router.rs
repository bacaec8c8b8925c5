//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Build the monitoring API router.
///
/// Every response carries `Cache-Control: no-store`; views are derived
/// per request and must not be replayed by intermediaries.
pub fn api_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/box-status", get(endpoints::box_status::get))
        .route("/adherence", get(endpoints::adherence::get))
        .route("/feed", get(endpoints::feed::get))
        .route("/dashboard", get(endpoints::dashboard::get))
        .route("/trend/:metric", get(endpoints::trend::get))
        .route("/schedule/update", put(endpoints::schedule::update))
        .route("/alerts/:id/ack", post(endpoints::alerts::acknowledge))
        .with_state(ctx);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .nest("/api", routes)
        .layer(axum::middleware::from_fn(middleware::access::log_access))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::MonitorConfig;
    use crate::fetch::monitor::tests::FakeSource;
    use crate::fetch::{FetchSettings, InMemoryStore, ScopeMonitor, StatusPoller};
    use crate::models::enums::{DoseStatus, ResourceKind};
    use crate::monitoring::MonitoringEngine;

    fn context_with(source: FakeSource) -> (ApiContext, Arc<FakeSource>) {
        let config = Arc::new(MonitorConfig::default());
        let source = Arc::new(source);
        let monitor = Arc::new(ScopeMonitor::new(
            source.clone(),
            Arc::new(InMemoryStore::new()),
            FetchSettings::from_config(&config),
        ));
        let poller = Arc::new(StatusPoller::new(monitor.clone(), config.poll_interval()));
        let engine = Arc::new(MonitoringEngine::new(&config));
        (ApiContext::new(engine, monitor, poller, config), source)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok_with_no_store() {
        let (ctx, _) = context_with(FakeSource::new());
        let response = api_router(ctx).oneshot(get_request("/api/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["watched_scopes"], 0);
    }

    #[tokio::test]
    async fn box_status_lists_devices_and_watches_scope() {
        let (ctx, _) = context_with(FakeSource::new());
        let poller = ctx.poller.clone();
        let response = api_router(ctx)
            .oneshot(get_request("/api/box-status?scope=household&viewer=fam"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let devices = json["devices"].as_array().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0]["user_name"], "Ana");
        assert_eq!(devices[0]["motion"], 0);
        assert_eq!(devices[0]["alerts"].as_array().unwrap().len(), 1);
        assert_eq!(json["trend"]["humidity"].as_array().unwrap().len(), 2);
        assert_eq!(poller.watched_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_viewer_is_a_bad_request() {
        let (ctx, _) = context_with(FakeSource::new());
        let response = api_router(ctx).oneshot(get_request("/api/feed")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn unknown_scope_is_a_bad_request() {
        let (ctx, _) = context_with(FakeSource::new());
        let response = api_router(ctx)
            .oneshot(get_request("/api/adherence?scope=everyone&viewer=fam"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn adherence_breaks_down_per_subject() {
        let (ctx, _) = context_with(FakeSource::new());
        let response = api_router(ctx)
            .oneshot(get_request("/api/adherence?scope=household&viewer=fam"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["summary"]["total"], 2);
        assert_eq!(json["summary"]["completion_rate"], 100);
        assert_eq!(json["subjects"].as_array().unwrap().len(), 2);
        assert_eq!(json["subjects"][1]["subject_name"], "Ben");
    }

    #[tokio::test]
    async fn feed_respects_limit_and_reports_failures() {
        let mut source = FakeSource::new();
        source.failing = vec![ResourceKind::History];
        let (ctx, _) = context_with(source);
        let response = api_router(ctx)
            .oneshot(get_request("/api/feed?scope=household&viewer=fam&limit=3"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["alerts"].as_array().unwrap().len(), 3);
        assert_eq!(json["errors"][0]["resource"], "history");
    }

    #[tokio::test]
    async fn dashboard_for_self_scope() {
        let (ctx, _) = context_with(FakeSource::new());
        let response = api_router(ctx)
            .oneshot(get_request("/api/dashboard?viewer=u1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["scope"]["kind"], "self");
        assert_eq!(json["adherence"]["total"], 1);
        assert_eq!(json["refills"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn trend_rejects_unknown_metric() {
        let (ctx, _) = context_with(FakeSource::new());
        let response = api_router(ctx)
            .oneshot(get_request("/api/trend/pressure?viewer=u1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn trend_rejects_oversized_window() {
        let (ctx, source) = context_with(FakeSource::new());
        let response = api_router(ctx)
            .oneshot(get_request("/api/trend/temperature?viewer=fam&window_hours=1e13"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn trend_projects_points() {
        let (ctx, _) = context_with(FakeSource::new());
        let response = api_router(ctx)
            .oneshot(get_request("/api/trend/humidity?scope=household&viewer=fam&width=600"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["metric"], "humidity");
        assert_eq!(json["canvas_width"], 600.0);
        assert_eq!(json["points"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn schedule_update_forwards_and_invalidates() {
        let (ctx, source) = context_with(FakeSource::new());
        let app = api_router(ctx);

        let warm = app
            .clone()
            .oneshot(get_request("/api/dashboard?scope=household&viewer=fam"))
            .await
            .unwrap();
        assert_eq!(warm.status(), StatusCode::OK);

        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/schedule/update",
                r#"{"scheduleId":"s1","status":"Taken","userId":"u2"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["updated"], true);
        assert_eq!(json["invalidated"], 4);

        let corrections = source.corrections.lock().unwrap();
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].status, DoseStatus::Taken);
    }

    #[tokio::test]
    async fn schedule_update_rejects_unknown_status() {
        let (ctx, source) = context_with(FakeSource::new());
        let response = api_router(ctx)
            .oneshot(json_request(
                "PUT",
                "/api/schedule/update",
                r#"{"scheduleId":"s1","status":"eaten","userId":"u2"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(source.corrections.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn acknowledgement_is_reflected_in_the_feed() {
        let (ctx, _) = context_with(FakeSource::new());
        let app = api_router(ctx);

        let feed = body_json(
            app.clone()
                .oneshot(get_request("/api/feed?scope=household&viewer=fam"))
                .await
                .unwrap(),
        )
        .await;
        let derived = feed["alerts"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["source_kind"] == "environment")
            .unwrap();
        let id = derived["id"].as_str().unwrap().to_string();

        let ack = app
            .clone()
            .oneshot(json_request("POST", &format!("/api/alerts/{id}/ack"), r#"{"viewer":"fam"}"#))
            .await
            .unwrap();
        assert_eq!(ack.status(), StatusCode::OK);
        assert_eq!(body_json(ack).await["acknowledged"], true);

        let feed = body_json(
            app.oneshot(get_request("/api/feed?scope=household&viewer=fam"))
                .await
                .unwrap(),
        )
        .await;
        let again = feed["alerts"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["id"] == id.as_str())
            .unwrap();
        assert_eq!(again["acknowledged"], true);
    }

    #[tokio::test]
    async fn acknowledge_rejects_malformed_id() {
        let (ctx, _) = context_with(FakeSource::new());
        let response = api_router(ctx)
            .oneshot(json_request("POST", "/api/alerts/not-a-uuid/ack", r#"{"viewer":"fam"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
