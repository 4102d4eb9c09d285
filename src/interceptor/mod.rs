//! Interceptors: cross-cutting logic run before and after a function.
//!
//! Hooks and plugins share one trait. A hook runs the same logic in both
//! phases; a plugin usually branches on [`Phase`]. The difference is only
//! reported in span tags and logs.

mod pipeline;
mod registry;

pub use pipeline::Pipeline;
pub use registry::{InterceptorRegistry, Lifecycle};

use crate::context::InvocationContext;
use crate::function::FunctionError;
use crate::telemetry::{SpanKind, SpanSpec};
use async_trait::async_trait;
use std::fmt;

/// Which side of the function body an interceptor runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pre,
    Post,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Pre => write!(f, "pre"),
            Phase::Post => write!(f, "post"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorKind {
    Hook,
    Plugin,
}

impl InterceptorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterceptorKind::Hook => "Hook",
            InterceptorKind::Plugin => "Plugin",
        }
    }
}

/// A hook or plugin.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "v1"
    }

    fn kind(&self) -> InterceptorKind {
        InterceptorKind::Hook
    }

    /// Extra tags for the span wrapping each execution.
    fn tags(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Whether each execution gets its own span.
    fn needs_tracing(&self) -> bool {
        true
    }

    async fn execute(&self, phase: Phase, ctx: &mut InvocationContext) -> Result<(), FunctionError>;
}

/// Span describing one interceptor execution.
pub(crate) fn span_spec(interceptor: &dyn Interceptor) -> SpanSpec {
    SpanSpec::new(interceptor.name(), SpanKind::Internal)
        .tag("kind", interceptor.kind().as_str())
        .tag("name", interceptor.name())
        .tag("version", interceptor.version())
        .tags(interceptor.tags())
}
