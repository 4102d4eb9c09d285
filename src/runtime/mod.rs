//! Process configuration and runtime wiring.

mod config;
mod server;

pub use config::{
    RuntimeConfig, ENV_APP_CALLBACK_PORT, ENV_DAPR_HTTP_PORT, ENV_FUNCTION_TARGET, ENV_FUNC_CONTEXT,
    ENV_POD_NAME, ENV_POD_NAMESPACE,
};
pub use server::{Runtime, StartedRuntime};

use crate::config::ConfigError;
use crate::function::RegistryError;
use crate::sidecar::SidecarError;
use thiserror::Error;

/// Everything that can stop the runtime from starting or serving.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("sidecar unavailable: {0}")]
    Sidecar(#[from] SidecarError),

    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    #[error("listener failed: {0}")]
    Io(#[from] std::io::Error),
}
