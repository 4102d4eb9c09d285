//! Client side of the sidecar's messaging API.

mod http;

pub use self::http::DaprHttpClient;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("invalid sidecar request: {0}")]
    InvalidRequest(String),

    #[error("sidecar connection failed: {0}")]
    Connection(String),

    #[error("sidecar returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("sidecar not ready after {0:?}")]
    Timeout(Duration),
}

/// Operations the runtime needs from the sidecar.
#[async_trait]
pub trait SidecarClient: Send + Sync {
    /// Publish `data` to `topic` on the pub/sub component `pubsub_name`.
    async fn publish(
        &self,
        pubsub_name: &str,
        topic: &str,
        data: Bytes,
        metadata: &HashMap<String, String>,
    ) -> Result<(), SidecarError>;

    /// Invoke an output binding and return whatever it answers.
    async fn invoke_binding(
        &self,
        name: &str,
        operation: &str,
        data: Bytes,
        metadata: &HashMap<String, String>,
    ) -> Result<Bytes, SidecarError>;

    /// Block until the sidecar accepts outbound calls.
    async fn wait_for_sidecar(&self, _timeout: Duration) -> Result<(), SidecarError> {
        Ok(())
    }
}
