//! Backend that reports spans as structured log events.

use super::{Parent, ProviderSpan, SpanContext, SpanKind, SpanStart, TracingProvider};
use std::time::Instant;
use tracing::{error, info};

/// Writes span start and end through the `tracing` subscriber.
#[derive(Debug, Default, Clone)]
pub struct LogProvider;

impl LogProvider {
    pub fn new() -> Self {
        Self
    }
}

impl TracingProvider for LogProvider {
    fn name(&self) -> &'static str {
        "log"
    }

    fn start_span(&self, start: SpanStart<'_>) -> Box<dyn ProviderSpan> {
        let parent = match start.parent {
            Parent::Root => None,
            Parent::Span(context) => Some(context.clone()),
            Parent::Carrier(carrier) => SpanContext::from_carrier(carrier),
        };
        let context = parent
            .as_ref()
            .map(SpanContext::child)
            .unwrap_or_else(SpanContext::root)
            .with_baggage(start.baggage.clone());

        let attributes = start
            .attributes
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");

        info!(
            trace_id = %context.trace_id_hex(),
            span_id = %context.span_id_hex(),
            parent_id = %parent.map(|p| p.span_id_hex()).unwrap_or_default(),
            kind = ?start.kind,
            attributes = %attributes,
            "Span {} started",
            start.name
        );

        Box::new(LogSpan {
            name: start.name.to_string(),
            kind: start.kind,
            context,
            started: Instant::now(),
            error: None,
        })
    }
}

struct LogSpan {
    name: String,
    kind: SpanKind,
    context: SpanContext,
    started: Instant,
    error: Option<String>,
}

impl ProviderSpan for LogSpan {
    fn context(&self) -> SpanContext {
        self.context.clone()
    }

    fn set_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }

    fn end(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match &self.error {
            Some(message) => error!(
                trace_id = %self.context.trace_id_hex(),
                span_id = %self.context.span_id_hex(),
                kind = ?self.kind,
                elapsed_ms,
                "Span {} failed: {}",
                self.name,
                message
            ),
            None => info!(
                trace_id = %self.context.trace_id_hex(),
                span_id = %self.context.span_id_hex(),
                kind = ?self.kind,
                elapsed_ms,
                "Span {} ended",
                self.name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_span_lifecycle_is_logged() {
        let baggage = BTreeMap::new();
        let mut span = LogProvider::new().start_span(SpanStart {
            name: "hook",
            kind: SpanKind::Internal,
            parent: &Parent::Root,
            attributes: &[("hook.name".to_string(), "audit".to_string())],
            baggage: &baggage,
        });
        span.set_error("denied");
        span.end();

        assert!(logs_contain("Span hook started"));
        assert!(logs_contain("hook.name=audit"));
        assert!(logs_contain("Span hook failed: denied"));
    }
}
