// src/bootstrap/endpoints.rs
use crate::health::{HealthRegistry, HealthReport, HealthStatus, TagSet, LIVE_TAG};
use crate::metrics::MetricsRegistry;
use crate::server::router::text_response;
use crate::server::{RouteError, Router};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Response, StatusCode};
use std::sync::Arc;
use tracing::error;

pub const HEALTH_PATH: &str = "/health";
pub const ALIVE_PATH: &str = "/alive";

/// Registers `/health` (every probe) and `/alive` (probes tagged "live").
///
/// Both routes are checked before either is added, so a duplicate leaves the
/// router as it was.
pub fn map_health_endpoints(
    router: &mut Router,
    registry: Arc<HealthRegistry>,
) -> Result<(), RouteError> {
    for path in [HEALTH_PATH, ALIVE_PATH] {
        if router.has_route(path) {
            return Err(RouteError::DuplicateRoute(path.to_string()));
        }
    }

    let all = registry.clone();
    router.route(HEALTH_PATH, move |_req| {
        let registry = all.clone();
        async move { health_response(&registry.evaluate(None).await) }
    })?;

    let live = registry;
    router.route(ALIVE_PATH, move |_req| {
        let registry = live.clone();
        async move {
            let filter = TagSet::from([LIVE_TAG.to_string()]);
            health_response(&registry.evaluate(Some(&filter)).await)
        }
    })?;

    Ok(())
}

pub fn map_metrics_endpoint(
    router: &mut Router,
    path: &str,
    registry: Arc<MetricsRegistry>,
) -> Result<(), RouteError> {
    router.route(path, move |_req| {
        let registry = registry.clone();
        async move {
            match registry.gather() {
                Ok(body) => {
                    let mut response = Response::new(Body::from(body));
                    response.headers_mut().insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static("text/plain; version=0.0.4"),
                    );
                    response
                }
                Err(e) => {
                    error!(error = %e, "Failed to encode metrics");
                    text_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics")
                }
            }
        }
    })
}

/// 503 when the aggregate is unhealthy, 200 for healthy or degraded. The
/// body is always the JSON report.
pub fn health_response(report: &HealthReport) -> Response<Body> {
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };

    let body = match serde_json::to_vec(report) {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Failed to serialize health report");
            return text_response(StatusCode::SERVICE_UNAVAILABLE, "Unhealthy");
        }
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Request;
    use std::time::Duration;

    async fn get(router: &Router, path: &str) -> (StatusCode, HealthReport) {
        let response = router
            .dispatch(Request::get(path).body(Body::empty()).unwrap())
            .await;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_live_and_full_views() {
        let registry = Arc::new(HealthRegistry::new(Duration::from_secs(1), None));
        registry.register_fn("db", [LIVE_TAG], || HealthStatus::Healthy).unwrap();
        registry
            .register_fn("cache", Vec::<String>::new(), || HealthStatus::Degraded)
            .unwrap();

        let mut router = Router::new();
        map_health_endpoints(&mut router, registry).unwrap();

        let (status, report) = get(&router, ALIVE_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.probes.len(), 1);

        let (status, report) = get(&router, HEALTH_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.probes.len(), 2);
    }

    #[tokio::test]
    async fn test_unhealthy_check_returns_503() {
        let registry = Arc::new(HealthRegistry::new(Duration::from_secs(1), None));
        registry.register_fn("db", [LIVE_TAG], || HealthStatus::Healthy).unwrap();
        registry
            .register_fn("queue", Vec::<String>::new(), || HealthStatus::Unhealthy)
            .unwrap();

        let mut router = Router::new();
        map_health_endpoints(&mut router, registry).unwrap();

        let (status, report) = get(&router, HEALTH_PATH).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, HealthStatus::Unhealthy);

        let (status, _) = get(&router, ALIVE_PATH).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_status_code_mapping() {
        let report = |status| HealthReport::from_results([("db".to_string(), status)]);
        assert_eq!(health_response(&report(HealthStatus::Healthy)).status(), StatusCode::OK);
        assert_eq!(health_response(&report(HealthStatus::Degraded)).status(), StatusCode::OK);
        assert_eq!(
            health_response(&report(HealthStatus::Unhealthy)).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_mapping_twice_on_same_router_fails() {
        let registry = Arc::new(HealthRegistry::new(Duration::from_secs(1), None));
        let mut router = Router::new();

        map_health_endpoints(&mut router, registry.clone()).unwrap();
        let err = map_health_endpoints(&mut router, registry.clone()).unwrap_err();
        assert!(matches!(err, RouteError::DuplicateRoute(_)));

        let mut other = Router::new();
        map_health_endpoints(&mut other, registry).unwrap();
    }

    #[test]
    fn test_partial_conflict_adds_nothing() {
        let registry = Arc::new(HealthRegistry::new(Duration::from_secs(1), None));
        let mut router = Router::new();
        router
            .route(ALIVE_PATH, |_req| async { text_response(StatusCode::OK, "mine") })
            .unwrap();

        assert!(map_health_endpoints(&mut router, registry).is_err());
        assert!(!router.has_route(HEALTH_PATH));
    }
}
