//! Function descriptor, component records and tracing settings.
//!
//! The descriptor is the declarative description of one function: its
//! inputs, outputs and states, the triggers it listens on, the hooks run
//! around it and how it is traced. It is parsed once at startup and is
//! immutable afterwards.

pub mod component;
pub mod descriptor;
pub mod telemetry;

pub use component::{Component, ComponentKind, ComponentRegistry, TopicSubscription};
pub use descriptor::{EventTrigger, FunctionDescriptor, HttpTrigger, TriggerSet, Triggers};
pub use telemetry::{ExporterSettings, ProviderKind, ProviderSettings, TracingSettings};

use thiserror::Error;

/// Startup errors. Every variant is fatal: the process must not start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed function descriptor: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("function descriptor has no name")]
    MissingName,

    #[error("no trigger defined for function '{0}'")]
    MissingTrigger(String),

    #[error("environment variable {0} not set")]
    MissingEnv(&'static str),

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("unsupported tracing provider {0}")]
    UnsupportedTracingProvider(String),

    #[error("tracing provider {0} is not built into this runtime, use opentelemetry instead")]
    TracingProviderUnavailable(String),
}
