// src/server/router.rs
use futures::future::BoxFuture;
use hyper::{header, Body, Method, Request, Response, StatusCode};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

type RouteHandler = Arc<dyn Fn(Request<Body>) -> BoxFuture<'static, Response<Body>> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route '{0}' is already registered")]
    DuplicateRoute(String),
}

/// Exact-path GET router.
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<String, RouteHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<F, Fut>(&mut self, path: &str, handler: F) -> Result<(), RouteError>
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<Body>> + Send + 'static,
    {
        if self.routes.contains_key(path) {
            return Err(RouteError::DuplicateRoute(path.to_string()));
        }

        let handler: RouteHandler =
            Arc::new(move |req| -> BoxFuture<'static, Response<Body>> { Box::pin(handler(req)) });
        self.routes.insert(path.to_string(), handler);
        Ok(())
    }

    pub fn has_route(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    pub async fn dispatch(&self, req: Request<Body>) -> Response<Body> {
        let Some(handler) = self.routes.get(req.uri().path()) else {
            return text_response(StatusCode::NOT_FOUND, "Not Found");
        };

        if req.method() != Method::GET && req.method() != Method::HEAD {
            let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            response
                .headers_mut()
                .insert(header::ALLOW, header::HeaderValue::from_static("GET, HEAD"));
            return response;
        }

        handler(req).await
    }
}

pub(crate) fn text_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}
