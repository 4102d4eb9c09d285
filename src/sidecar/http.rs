//! Sidecar client speaking the Dapr HTTP API.

use super::{SidecarClient, SidecarError};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const API_VERSION: &str = "v1.0";
const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Serialize)]
struct BindingRequest<'a> {
    data: serde_json::Value,
    metadata: &'a HashMap<String, String>,
    operation: &'a str,
}

/// Talks to the sidecar on `http://{host}:{port}`.
#[derive(Clone)]
pub struct DaprHttpClient {
    base_url: String,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl DaprHttpClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{}:{}", host, port),
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<Bytes, SidecarError> {
        let uri = format!("{}/{}/{}", self.base_url, API_VERSION, path);
        let request = Request::builder()
            .method(method)
            .uri(&uri)
            .header("content-type", content_type)
            .body(Full::new(body))
            .map_err(|e| SidecarError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| SidecarError::Connection(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| SidecarError::Connection(e.to_string()))?
            .to_bytes();

        if !(200..300).contains(&status) {
            return Err(SidecarError::Status {
                status,
                body: String::from_utf8_lossy(&body).to_string(),
            });
        }
        debug!("Sidecar {} answered {}", uri, status);
        Ok(body)
    }
}

#[async_trait]
impl SidecarClient for DaprHttpClient {
    async fn publish(
        &self,
        pubsub_name: &str,
        topic: &str,
        data: Bytes,
        metadata: &HashMap<String, String>,
    ) -> Result<(), SidecarError> {
        let path = publish_path(pubsub_name, topic, metadata);
        let content_type = if serde_json::from_slice::<serde_json::Value>(&data).is_ok() {
            "application/json"
        } else {
            "text/plain"
        };
        self.send(Method::POST, &path, content_type, data).await?;
        Ok(())
    }

    async fn invoke_binding(
        &self,
        name: &str,
        operation: &str,
        data: Bytes,
        metadata: &HashMap<String, String>,
    ) -> Result<Bytes, SidecarError> {
        let body = serde_json::to_vec(&BindingRequest {
            data: binding_data(&data),
            metadata,
            operation,
        })
        .map_err(|e| SidecarError::InvalidRequest(e.to_string()))?;

        let path = format!("bindings/{}", urlencoding::encode(name));
        self.send(Method::POST, &path, "application/json", Bytes::from(body))
            .await
    }

    async fn wait_for_sidecar(&self, timeout: Duration) -> Result<(), SidecarError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Each attempt is bounded too: a silent sidecar never fails the request.
            let remaining = deadline.saturating_duration_since(Instant::now());
            let attempt = tokio::time::timeout(
                remaining,
                self.send(Method::GET, "healthz/outbound", "text/plain", Bytes::new()),
            )
            .await;
            match attempt {
                Ok(Ok(_)) => {
                    info!("Sidecar at {} is ready", self.base_url);
                    return Ok(());
                }
                Ok(Err(err)) => debug!("Sidecar not ready yet: {}", err),
                Err(_) => debug!("Sidecar health check did not answer in time"),
            }
            if Instant::now() >= deadline {
                return Err(SidecarError::Timeout(timeout));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(HEALTH_POLL_INTERVAL.min(remaining)).await;
        }
    }
}

/// JSON objects and arrays are embedded as-is. Everything else, including
/// text that happens to parse as a JSON scalar, stays a string.
fn binding_data(data: &[u8]) -> serde_json::Value {
    match serde_json::from_slice::<serde_json::Value>(data) {
        Ok(value @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => value,
        _ => serde_json::Value::from(String::from_utf8_lossy(data).to_string()),
    }
}

fn publish_path(pubsub_name: &str, topic: &str, metadata: &HashMap<String, String>) -> String {
    format!(
        "publish/{}/{}{}",
        urlencoding::encode(pubsub_name),
        urlencoding::encode(topic),
        metadata_query(metadata)
    )
}

fn metadata_query(metadata: &HashMap<String, String>) -> String {
    if metadata.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<_> = metadata
        .iter()
        .map(|(k, v)| format!("metadata.{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    pairs.sort();
    format!("?{}", pairs.join("&"))
}
