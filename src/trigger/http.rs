//! HTTP trigger: one invocation per request.

use super::listener::Handler;
use crate::context::{CloudEvent, Inbound, InvocationContext, Out, RuntimeContext};
use crate::function::Function;
use crate::http::{HttpRequest, HttpResponse, StatusCode};
use crate::invoker;
use crate::telemetry::SpanContext;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, warn};

/// Serves one function over HTTP.
pub struct HttpAdapter {
    runtime: Arc<RuntimeContext>,
    function_name: String,
    function: Function,
    path: String,
}

impl HttpAdapter {
    /// A raw-HTTP function's own path wins over the descriptor's.
    pub fn new(runtime: Arc<RuntimeContext>, function_name: impl Into<String>, function: Function) -> Self {
        let path = match &function {
            Function::Http(f) if f.path() != "/" => f.path().to_string(),
            _ => runtime.descriptor().http_path(),
        };
        Self {
            runtime,
            function_name: function_name.into(),
            function,
            path,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Answer one request. Never fails: every error, including a panic
    /// in the function, becomes an error response.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        if !path_matches(&self.path, &request.path) {
            return HttpResponse::error(StatusCode::NOT_FOUND, "Not Found");
        }

        if let Function::Http(f) = &self.function {
            if !f.methods().contains(&request.method) {
                return HttpResponse::error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            }
        }

        match AssertUnwindSafe(self.dispatch(request)).catch_unwind().await {
            Ok(response) => response,
            Err(_) => {
                error!("Function '{}' panicked while serving a request", self.function_name);
                HttpResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }

    async fn dispatch(&self, request: HttpRequest) -> HttpResponse {
        let parent = SpanContext::from_carrier(&request.headers);

        let inbound = match &self.function {
            Function::CloudEvent(_) => match CloudEvent::from_http(&request) {
                Ok(Some(event)) => Inbound::CloudEvent(event),
                Ok(None) => {
                    warn!("Request for '{}' carries no structured event", self.function_name);
                    return HttpResponse::error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "request carries no structured event",
                    );
                }
                Err(err) => {
                    warn!("Failed to parse structured event: {}", err);
                    return HttpResponse::error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
                }
            },
            _ => Inbound::http(request),
        };

        let parent = match (&inbound, parent) {
            (Inbound::CloudEvent(event), None) => SpanContext::from_carrier(&event.carrier()),
            (_, parent) => parent,
        };

        let mut ctx = InvocationContext::new(self.function_name.clone(), self.runtime.clone(), inbound);
        ctx.set_active_span(parent);
        let mut ctx = invoker::invoke(&self.function, ctx).await;

        match &self.function {
            Function::Http(_) => match ctx.into_inbound() {
                Inbound::Http { response, .. } => response,
                _ => HttpResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            },
            _ => out_response(ctx.take_out()),
        }
    }
}

#[async_trait]
impl Handler for HttpAdapter {
    async fn handle(&self, request: HttpRequest) -> HttpResponse {
        HttpAdapter::handle(self, request).await
    }
}

/// Write a result to the HTTP transport.
pub fn out_response(out: Option<Out>) -> HttpResponse {
    let out = Out::normalize(out);
    let mut response = HttpResponse::new(out.status()).body(out.body());
    if let Some(metadata) = out.metadata {
        response.headers.extend(metadata);
    }
    response
}

fn path_matches(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}
