//! HTTP surface for the health checker.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::health::aggregator::{HealthChecker, Status};

/// Path of the aggregate health endpoint.
pub const HEALTH_PATH: &str = "/zhealth";

/// Path of the Prometheus scrape endpoint, when enabled.
pub const METRICS_PATH: &str = "/metrics";

/// Routes serving the health of a [`HealthChecker`].
pub struct HealthApi {
    router: Router,
}

impl HealthApi {
    pub fn new(checker: HealthChecker) -> Self {
        Self::build(checker, None)
    }

    /// Also serve `prometheus` on [`METRICS_PATH`].
    pub fn with_metrics(checker: HealthChecker, prometheus: PrometheusHandle) -> Self {
        Self::build(checker, Some(prometheus))
    }

    fn build(checker: HealthChecker, prometheus: Option<PrometheusHandle>) -> Self {
        let mut router = Router::new()
            .route(HEALTH_PATH, get(handle_health))
            .with_state(Arc::new(checker));

        if let Some(handle) = prometheus {
            router = router.route(METRICS_PATH, get(move || std::future::ready(handle.render())));
        }

        Self { router }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

async fn handle_health(State(checker): State<Arc<HealthChecker>>) -> Response {
    let report = checker.measure().await;

    let code = match report.status {
        Status::Healthy => StatusCode::OK,
        Status::Degraded => {
            tracing::warn!("Serving degraded health status");
            StatusCode::OK
        }
        Status::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    };

    // The status code stands on its own; an unserializable report is sent
    // with an empty body.
    let body = serde_json::to_vec(&report).unwrap_or_default();

    (code, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}
