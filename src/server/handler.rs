// src/server/handler.rs
use hyper::{Body, Request, Response};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use tracing::debug;

use crate::metrics::{MetricsCollector, Timer};
use crate::server::Router;
use crate::telemetry::{Attributes, TelemetryPipeline, TelemetrySource};

/// Source name for the spans and metrics emitted per HTTP request.
pub const HTTP_SOURCE: &str = "http.server";

/// Routes requests and records a span, a duration metric and the
/// Prometheus request counters for each one.
#[derive(Clone)]
pub struct RequestHandler {
    router: Arc<Router>,
    telemetry: Arc<TelemetryPipeline>,
    source: TelemetrySource,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RequestHandler {
    pub fn new(
        router: Router,
        telemetry: Arc<TelemetryPipeline>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let source = telemetry.register_source(HTTP_SOURCE);
        Self {
            router: Arc::new(router),
            telemetry,
            source,
            metrics,
        }
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let timer = Timer::new();
        let method = req.method().clone();

        // Unknown paths share one label so scanners can't blow up cardinality.
        let route = if self.router.has_route(req.uri().path()) {
            req.uri().path().to_string()
        } else {
            "unmatched".to_string()
        };

        let attributes = Attributes::from([
            ("http.method", method.as_str()),
            ("http.route", route.as_str()),
        ]);
        let mut span = self.telemetry.start_span(
            &self.source,
            &format!("{} {}", method, route),
            attributes.clone(),
        );

        let response = self.router.dispatch(req).await;
        let status = response.status().as_u16();
        let elapsed = timer.elapsed();

        span.set_attribute("http.status_code", status.to_string());
        self.telemetry.end_span(span);
        self.telemetry.record_metric(
            &self.source,
            "http.server.request.duration",
            elapsed.as_secs_f64(),
            attributes.with("http.status_code", status.to_string()),
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_request(method.as_str(), &route, status, elapsed);
        }

        debug!(%method, route = %route, status, ?elapsed, "Request handled");
        response
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.handle(req).await) })
    }
}
