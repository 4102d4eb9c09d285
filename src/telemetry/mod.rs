//! Tracing gateway: one facade over the configured tracing backend.
//!
//! Callers describe a span with a [`SpanSpec`] and a [`Parent`] and get
//! back a [`SpanGuard`]. With tracing disabled no span is created and
//! the wrapped work runs exactly as it would untraced.

pub mod log;
pub mod otel;
mod span;

pub use span::{Parent, SpanContext, SpanKind, SpanSpec};

use crate::config::{ConfigError, ProviderKind, TracingSettings};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Provider identity reported in the `faas.invoked_provider` tag.
pub const PROVIDER_IDENTITY: &str = "fninvoke";

pub const TAG_INVOKED_NAME: &str = "faas.invoked_name";
pub const TAG_INVOKED_PROVIDER: &str = "faas.invoked_provider";

/// Everything a backend needs to open one span.
pub struct SpanStart<'a> {
    pub name: &'a str,
    pub kind: SpanKind,
    pub parent: &'a Parent,
    pub attributes: &'a [(String, String)],
    pub baggage: &'a BTreeMap<String, String>,
}

/// A tracing backend.
pub trait TracingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn start_span(&self, start: SpanStart<'_>) -> Box<dyn ProviderSpan>;
}

/// A span opened by a backend, not yet ended.
pub trait ProviderSpan: Send {
    fn context(&self) -> SpanContext;

    fn set_error(&mut self, message: &str);

    fn end(&mut self);
}

/// Owns an open span; the span ends exactly once, on `finish` or drop.
pub struct SpanGuard {
    span: Option<Box<dyn ProviderSpan>>,
    context: SpanContext,
}

impl SpanGuard {
    fn new(span: Box<dyn ProviderSpan>) -> Self {
        let context = span.context();
        Self {
            span: Some(span),
            context,
        }
    }

    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    /// Mark the span failed without ending it.
    pub fn record_error(&mut self, message: &str) {
        if let Some(span) = self.span.as_mut() {
            span.set_error(message);
        }
    }

    /// End the span, recording `error` first when present.
    pub fn finish(mut self, error: Option<&str>) {
        if let Some(mut span) = self.span.take() {
            if let Some(message) = error {
                span.set_error(message);
            }
            span.end();
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if let Some(mut span) = self.span.take() {
            span.end();
        }
    }
}

impl fmt::Debug for SpanGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanGuard")
            .field("context", &self.context)
            .field("open", &self.span.is_some())
            .finish()
    }
}

/// Facade in front of the tracing backend chosen at startup.
#[derive(Clone)]
pub struct TracingGateway {
    function_name: String,
    provider: Option<Arc<dyn TracingProvider>>,
    tags: BTreeMap<String, String>,
    baggage: BTreeMap<String, String>,
}

impl TracingGateway {
    /// A gateway that never opens spans.
    pub fn disabled(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            provider: None,
            tags: BTreeMap::new(),
            baggage: BTreeMap::new(),
        }
    }

    pub fn new(function_name: impl Into<String>, provider: Arc<dyn TracingProvider>) -> Self {
        Self {
            provider: Some(provider),
            ..Self::disabled(function_name)
        }
    }

    /// Build the gateway from the descriptor's tracing section.
    pub fn from_settings(
        function_name: impl Into<String>,
        settings: Option<&TracingSettings>,
    ) -> Result<Self, ConfigError> {
        let function_name = function_name.into();
        let Some(settings) = settings else {
            return Ok(Self::disabled(function_name));
        };

        let provider: Arc<dyn TracingProvider> = match settings.provider_kind()? {
            None => return Ok(Self::disabled(function_name)),
            Some(ProviderKind::OpenTelemetry) => {
                if let Some(exporter) = settings.exporter() {
                    debug!(
                        "Exporter '{}' configured; spans stay in-process",
                        exporter.name
                    );
                }
                Arc::new(otel::OtelProvider::new(&function_name))
            }
            Some(ProviderKind::Log) => Arc::new(log::LogProvider::new()),
        };

        let mut gateway = Self::new(function_name, provider);
        gateway.tags = settings.tags.clone();
        gateway.baggage = settings.baggage.clone();
        Ok(gateway)
    }

    /// Add a static tag applied to every span.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_baggage(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.baggage.insert(key.into(), value.into());
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider_name(&self) -> Option<&'static str> {
        self.provider.as_ref().map(|p| p.name())
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Open a span, or return `None` when tracing is disabled.
    pub fn start_span(&self, spec: SpanSpec, parent: Parent) -> Option<SpanGuard> {
        let provider = self.provider.as_ref()?;

        let mut attributes = vec![
            (TAG_INVOKED_NAME.to_string(), self.function_name.clone()),
            (
                TAG_INVOKED_PROVIDER.to_string(),
                PROVIDER_IDENTITY.to_string(),
            ),
        ];
        attributes.extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        attributes.extend(spec.tags);

        let mut baggage = self.baggage.clone();
        if let Parent::Span(context) = &parent {
            baggage.extend(context.baggage.clone());
        }

        let span = provider.start_span(SpanStart {
            name: &spec.name,
            kind: spec.kind,
            parent: &parent,
            attributes: &attributes,
            baggage: &baggage,
        });
        Some(SpanGuard::new(span))
    }

    /// Run `work` inside a span and return its result unchanged.
    ///
    /// `work` receives the context of the span it runs in, `None` when
    /// tracing is disabled. An `Err` marks the span failed; when
    /// disabled it is logged at warn level instead.
    pub async fn execute_with_tracing<F, Fut, T, E>(
        &self,
        spec: SpanSpec,
        parent: Parent,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Option<SpanContext>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        match self.start_span(spec, parent) {
            None => {
                let result = work(None).await;
                if let Err(err) = &result {
                    warn!("Execution failed: {}", err);
                }
                result
            }
            Some(guard) => {
                let result = work(Some(guard.context().clone())).await;
                let error = result.as_ref().err().map(ToString::to_string);
                guard.finish(error.as_deref());
                result
            }
        }
    }
}

impl fmt::Debug for TracingGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingGateway")
            .field("function_name", &self.function_name)
            .field("provider", &self.provider_name())
            .field("tags", &self.tags)
            .finish()
    }
}
