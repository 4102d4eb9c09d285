//! Shared HTTP/1 accept loop for the trigger servers.

use crate::http::{HttpRequest, HttpResponse, Method, StatusCode};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Anything that turns one request into one response.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: HttpRequest) -> HttpResponse;
}

/// A bound socket plus the handler serving it.
pub struct Listener {
    listener: TcpListener,
    handler: Arc<dyn Handler>,
    max_body_size: usize,
    name: &'static str,
}

impl Listener {
    pub async fn bind(
        addr: SocketAddr,
        handler: Arc<dyn Handler>,
        max_body_size: usize,
        name: &'static str,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            handler,
            max_body_size,
            name,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the socket fails. Each connection is
    /// served on its own task.
    pub async fn run(self) -> io::Result<()> {
        info!("{} listening on {}", self.name, self.local_addr()?);

        loop {
            let (stream, remote_addr) = self.listener.accept().await?;
            let io = TokioIo::new(stream);

            let handler = self.handler.clone();
            let max_body_size = self.max_body_size;

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    async move { serve(req, handler, max_body_size, remote_addr).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection: {:?}", err);
                }
            });
        }
    }
}

async fn serve(
    req: Request<Incoming>,
    handler: Arc<dyn Handler>,
    max_body_size: usize,
    remote_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let request_id = Uuid::new_v4();
    debug!(
        "Handling request: {} {} from {} [{}]",
        req.method(),
        req.uri().path(),
        remote_addr,
        request_id
    );

    let request = match convert_request(req, max_body_size).await {
        Ok(request) => request,
        Err(response) => return Ok(build_response(response)),
    };

    let response = handler.handle(request).await;
    debug!("Answered {} [{}]", response.status.0, request_id);
    Ok(build_response(response))
}

/// Convert a hyper request, refusing bodies above `max_body_size`.
pub(crate) async fn convert_request(
    req: Request<Incoming>,
    max_body_size: usize,
) -> Result<HttpRequest, HttpResponse> {
    let method = Method::from(req.method());
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let mut headers = HashMap::new();
    for (name, value) in req.headers() {
        if let Ok(v) = value.to_str() {
            headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
        }
    }

    let body = match Limited::new(req.into_body(), max_body_size).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!("Failed to read request body: {}", err);
            return Err(HttpResponse::error(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
            ));
        }
    };

    Ok(HttpRequest {
        method,
        path,
        query,
        headers,
        body: if body.is_empty() { None } else { Some(body) },
    })
}

/// Build a hyper response from an [`HttpResponse`].
pub(crate) fn build_response(response: HttpResponse) -> Response<Full<Bytes>> {
    let status = hyper::StatusCode::from_u16(response.status.0).unwrap_or_else(|_| {
        warn!(
            "Invalid status code {}, falling back to 500 Internal Server Error",
            response.status.0
        );
        hyper::StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut builder = Response::builder().status(status);
    for (name, value) in response.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => builder = builder.header(name, value),
            _ => warn!("Skipping invalid response header '{}'", name),
        }
    }

    builder
        .body(Full::new(response.body.unwrap_or_default()))
        .unwrap_or_else(|err| {
            error!("Cannot build response: {}", err);
            let mut fallback = Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
            *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
