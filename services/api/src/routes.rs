use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use skillgate::learning::{learning_router, LearningService};
use std::sync::Arc;

pub(crate) fn with_learning_routes(service: Arc<LearningService>) -> axum::Router {
    learning_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{hint_generator, learning_service, load_catalog, DEMO_LEARNER};
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use skillgate::config::LearningConfig;
    use skillgate::learning::{
        HintPolicy, InMemoryAttempts, InMemoryProgressStore, SystemClock, UserId,
    };
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state(ready: bool) -> AppState {
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        }
    }

    fn learning_config() -> LearningConfig {
        LearningConfig {
            hint_policy: HintPolicy::default(),
            hint_generator_url: None,
            hint_generator_timeout: Duration::from_secs(30),
            catalog_path: None,
        }
    }

    async fn demo_router() -> axum::Router {
        let config = learning_config();
        let store = InMemoryProgressStore::default();
        store.register_profile(UserId::from(DEMO_LEARNER)).await;
        let service = learning_service(
            &config,
            load_catalog(None).expect("demo catalog"),
            Arc::new(store),
            Arc::new(InMemoryAttempts::default()),
            hint_generator(&config).expect("canned generator"),
            Arc::new(SystemClock),
        )
        .expect("service builds");
        with_learning_routes(Arc::new(service)).layer(Extension(state(true)))
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn readiness_reflects_flag() {
        let pending = readiness_endpoint(Extension(state(false)))
            .await
            .into_response();
        assert_eq!(pending.status(), StatusCode::SERVICE_UNAVAILABLE);

        let ready = readiness_endpoint(Extension(state(true)))
            .await
            .into_response();
        assert_eq!(ready.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn learning_routes_are_mounted_next_to_probes() {
        let router = demo_router().await;

        let health = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let course = router
            .oneshot(
                Request::get("/api/v1/learning/users/demo-learner/courses/rust-101")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(course.status(), StatusCode::OK);
    }
}
