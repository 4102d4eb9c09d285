//! # fninvoke - a function-invocation runtime
//!
//! fninvoke runs user functions behind two kinds of triggers: a direct
//! HTTP trigger, and broker events (input bindings and topic
//! subscriptions) delivered by a sidecar. Every invocation goes through
//! the same pipeline: pre hooks, the function body, post hooks, each step
//! traced and each hook isolated from the others' failures.
//!
//! ## Architecture
//!
//! ```text
//!   HTTP request             sidecar callback (binding / topic)
//!        │                               │
//!        ▼                               ▼
//! ┌──────────────┐               ┌───────────────┐
//! │ HttpAdapter  │               │ EventAdapter  │
//! └──────┬───────┘               └───────┬───────┘
//!        └───────────────┬───────────────┘
//!                        ▼
//!   ┌───────────────────────────────────────────┐
//!   │ invoker: span ─ pre hooks ─ function ─    │
//!   │          normalize ─ post hooks           │
//!   └────────────────────┬──────────────────────┘
//!                        ▼
//!           InvocationContext::send ─► sidecar
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fninvoke::prelude::*;
//!
//! struct Orders;
//!
//! #[async_trait]
//! impl OpenFunction for Orders {
//!     async fn accept(
//!         &self,
//!         ctx: &mut InvocationContext,
//!         payload: &str,
//!     ) -> Result<Option<Out>, FunctionError> {
//!         ctx.send("notify", payload.to_owned())
//!             .await
//!             .map_err(|e| FunctionError::new(e.to_string()))?;
//!         Ok(None)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let runtime = Runtime::new(RuntimeConfig::from_env()?);
//!     runtime.register_function("orders", Function::open(Orders)).await?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! The process reads `FUNCTION_TARGET` (which registered functions to
//! run) and `FUNC_CONTEXT` (the JSON function descriptor). The descriptor
//! declares the triggers, the input/output/state components, the hooks
//! and the tracing provider.

pub mod config;
pub mod context;
pub mod function;
pub mod http;
pub mod interceptor;
pub mod invoker;
pub mod runtime;
pub mod sidecar;
pub mod telemetry;
pub mod trigger;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::context::{CloudEvent, InvocationContext, Out};
    pub use crate::function::{
        CloudEventFunction, Function, FunctionError, FunctionRegistry, HttpFunction, OpenFunction,
    };
    pub use crate::http::{HttpRequest, HttpResponse, Method, StatusCode};
    pub use crate::interceptor::{Interceptor, InterceptorKind, InterceptorRegistry, Phase};
    pub use crate::runtime::{Runtime, RuntimeConfig};
    pub use async_trait::async_trait;
    pub use fninvoke_macro::function;
}

// Re-export for convenience
pub use config::{ConfigError, FunctionDescriptor};
pub use context::{InvocationContext, Out};
pub use function::{Function, FunctionError, FunctionRegistry};
pub use runtime::{Runtime, RuntimeConfig, RuntimeError};
