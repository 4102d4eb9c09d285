//! Process configuration.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_FUNCTION_TARGET: &str = "FUNCTION_TARGET";
pub const ENV_FUNC_CONTEXT: &str = "FUNC_CONTEXT";
pub const ENV_POD_NAME: &str = "POD_NAME";
pub const ENV_POD_NAMESPACE: &str = "POD_NAMESPACE";
pub const ENV_DAPR_HTTP_PORT: &str = "DAPR_HTTP_PORT";
pub const ENV_APP_CALLBACK_PORT: &str = "APP_CALLBACK_PORT";

/// Configuration for the runtime process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Comma-separated identifiers of the functions to run.
    pub function_target: String,
    /// The function descriptor, as JSON.
    pub function_context: String,
    /// Host address to bind to.
    pub host: String,
    /// Pod name, reported as the `instance` span tag.
    pub pod_name: Option<String>,
    /// Pod namespace, reported as the `namespace` span tag.
    pub pod_namespace: Option<String>,
    /// Sidecar HTTP port; no sidecar client is built without it.
    pub sidecar_port: Option<u16>,
    /// Port of the event callback listener.
    pub callback_port: Option<u16>,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    /// How long to wait for the sidecar at startup.
    pub sidecar_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            function_target: String::new(),
            function_context: String::new(),
            host: "0.0.0.0".to_string(),
            pod_name: None,
            pod_namespace: None,
            sidecar_port: None,
            callback_port: None,
            max_body_size: 10 * 1024 * 1024, // 10MB
            sidecar_timeout: Duration::from_secs(60),
        }
    }
}

impl RuntimeConfig {
    /// Create a new config with default values.
    pub fn new(function_target: impl Into<String>, function_context: impl Into<String>) -> Self {
        Self {
            function_target: function_target.into(),
            function_context: function_context.into(),
            ..Self::default()
        }
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`. Empty values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let port = |key: &str| -> Result<Option<u16>, ConfigError> {
            get(key)
                .map(|v| v.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort(v)))
                .transpose()
        };

        Ok(Self {
            function_target: get(ENV_FUNCTION_TARGET)
                .ok_or(ConfigError::MissingEnv(ENV_FUNCTION_TARGET))?,
            function_context: get(ENV_FUNC_CONTEXT).ok_or(ConfigError::MissingEnv(ENV_FUNC_CONTEXT))?,
            pod_name: get(ENV_POD_NAME),
            pod_namespace: get(ENV_POD_NAMESPACE),
            sidecar_port: port(ENV_DAPR_HTTP_PORT)?,
            callback_port: port(ENV_APP_CALLBACK_PORT)?,
            ..Self::default()
        })
    }

    /// Set the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn pod(mut self, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.pod_name = Some(name.into());
        self.pod_namespace = Some(namespace.into());
        self
    }

    pub fn sidecar_port(mut self, port: u16) -> Self {
        self.sidecar_port = Some(port);
        self
    }

    pub fn callback_port(mut self, port: u16) -> Self {
        self.callback_port = Some(port);
        self
    }

    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn sidecar_timeout(mut self, timeout: Duration) -> Self {
        self.sidecar_timeout = timeout;
        self
    }

    /// Get the bind address for `port`.
    pub fn bind_addr(&self, port: u16) -> String {
        format!("{}:{}", self.host, port)
    }
}
