use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;

/// A named readiness flag shared between the task that owns a dependency and
/// the health endpoint that reports on it.
#[derive(Debug, Clone)]
pub struct Readiness {
    name: &'static str,
    ready: Arc<AtomicBool>,
}

impl Readiness {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub checks: BTreeMap<&'static str, bool>,
}

impl HealthReport {
    pub fn collect(checks: &[Readiness]) -> Self {
        let checks: BTreeMap<_, _> = checks.iter().map(|c| (c.name(), c.is_ready())).collect();
        let status = if checks.values().all(|ready| *ready) {
            "ok"
        } else {
            "unavailable"
        };
        Self { status, checks }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// `GET /health`: 200 once every check is ready, 503 before that.
pub fn health_router(checks: Vec<Readiness>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(Arc::new(checks))
}

async fn health(State(checks): State<Arc<Vec<Readiness>>>) -> (StatusCode, Json<HealthReport>) {
    let report = HealthReport::collect(&checks);
    let status = if report.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_health(router: Router) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn starts_not_ready() {
        let readiness = Readiness::new("consumer");
        assert!(!readiness.is_ready());
        readiness.mark_ready();
        assert!(readiness.is_ready());
        readiness.mark_not_ready();
        assert!(!readiness.is_ready());
    }

    #[test]
    fn clones_share_state() {
        let readiness = Readiness::new("store");
        let observer = readiness.clone();
        readiness.mark_ready();
        assert!(observer.is_ready());
    }

    #[tokio::test]
    async fn health_is_unavailable_until_every_check_is_ready() {
        let store = Readiness::new("store");
        let consumer = Readiness::new("consumer");
        store.mark_ready();

        let router = health_router(vec![store.clone(), consumer.clone()]);
        let (status, json) = get_health(router).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["checks"]["store"], true);
        assert_eq!(json["checks"]["consumer"], false);

        consumer.mark_ready();
        let (status, json) = get_health(health_router(vec![store, consumer])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }
}
