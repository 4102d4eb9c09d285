//! OpenTelemetry backend built on the SDK tracer.

use super::{Parent, ProviderSpan, SpanContext, SpanKind, SpanStart, TracingProvider};
use opentelemetry::trace::{
    self as otel_trace, Span as _, SpanContext as OtelSpanContext, TraceContextExt as _,
    Tracer as _, TracerProvider as _,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::{self, Tracer, TracerProvider};
use opentelemetry_sdk::Resource;
use std::borrow::Cow;
use std::collections::BTreeMap;

const INSTRUMENTATION_NAME: &str = "fninvoke";

/// Opens spans through an OpenTelemetry SDK tracer.
#[derive(Clone)]
pub struct OtelProvider {
    // The tracer only holds a weak handle; the provider must outlive it.
    provider: TracerProvider,
    tracer: Tracer,
}

impl OtelProvider {
    /// A provider whose resource names the function as the service.
    pub fn new(function_name: &str) -> Self {
        let provider = TracerProvider::builder()
            .with_config(
                trace::config()
                    .with_sampler(trace::Sampler::AlwaysOn)
                    .with_resource(Resource::new(vec![KeyValue::new(
                        "service.name",
                        function_name.to_string(),
                    )])),
            )
            .build();
        Self::with_provider(provider)
    }

    /// Reuse an SDK provider configured elsewhere, e.g. with exporters.
    pub fn with_provider(provider: TracerProvider) -> Self {
        let tracer = provider.versioned_tracer(
            INSTRUMENTATION_NAME,
            Some(env!("CARGO_PKG_VERSION")),
            Some(Cow::Borrowed(env!("CARGO_PKG_NAME"))),
            None,
        );
        Self { provider, tracer }
    }

    pub fn sdk_provider(&self) -> &TracerProvider {
        &self.provider
    }
}

impl TracingProvider for OtelProvider {
    fn name(&self) -> &'static str {
        "opentelemetry"
    }

    fn start_span(&self, start: SpanStart<'_>) -> Box<dyn ProviderSpan> {
        let parent_context = match start.parent {
            Parent::Root => Context::new(),
            Parent::Span(context) => remote_context(context),
            Parent::Carrier(carrier) => SpanContext::from_carrier(carrier)
                .map(|context| remote_context(&context))
                .unwrap_or_default(),
        };

        let mut builder = self.tracer.span_builder(start.name.to_string());
        builder.span_kind = Some(otel_span_kind(start.kind));
        builder.attributes = Some(
            start
                .attributes
                .iter()
                .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
                .collect(),
        );

        let span = self.tracer.build_with_context(builder, &parent_context);
        Box::new(OtelSpan {
            span,
            baggage: start.baggage.clone(),
        })
    }
}

struct OtelSpan {
    span: opentelemetry_sdk::trace::Span,
    baggage: BTreeMap<String, String>,
}

impl ProviderSpan for OtelSpan {
    fn context(&self) -> SpanContext {
        from_otel(self.span.span_context(), &self.baggage)
    }

    fn set_error(&mut self, message: &str) {
        self.span
            .set_status(otel_trace::Status::error(message.to_string()));
    }

    fn end(&mut self) {
        self.span.end();
    }
}

fn otel_span_kind(kind: SpanKind) -> otel_trace::SpanKind {
    match kind {
        SpanKind::Server => otel_trace::SpanKind::Server,
        SpanKind::Client => otel_trace::SpanKind::Client,
        SpanKind::Producer => otel_trace::SpanKind::Producer,
        SpanKind::Consumer => otel_trace::SpanKind::Consumer,
        SpanKind::Internal => otel_trace::SpanKind::Internal,
    }
}

fn remote_context(parent: &SpanContext) -> Context {
    let flags = if parent.sampled {
        otel_trace::TraceFlags::SAMPLED
    } else {
        otel_trace::TraceFlags::default()
    };
    let span_context = OtelSpanContext::new(
        otel_trace::TraceId::from_bytes(parent.trace_id),
        otel_trace::SpanId::from_bytes(parent.span_id),
        flags,
        true,
        otel_trace::TraceState::default(),
    );
    Context::new().with_remote_span_context(span_context)
}

fn from_otel(context: &OtelSpanContext, baggage: &BTreeMap<String, String>) -> SpanContext {
    SpanContext {
        trace_id: context.trace_id().to_bytes(),
        span_id: context.span_id().to_bytes(),
        sampled: context.is_sampled(),
        baggage: baggage.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn start<'a>(
        parent: &'a Parent,
        baggage: &'a BTreeMap<String, String>,
    ) -> SpanStart<'a> {
        SpanStart {
            name: "function",
            kind: SpanKind::Server,
            parent,
            attributes: &[],
            baggage,
        }
    }

    #[test]
    fn test_root_span_gets_valid_ids() {
        let provider = OtelProvider::new("orders");
        let baggage = BTreeMap::new();
        let mut span = provider.start_span(start(&Parent::Root, &baggage));
        let context = span.context();
        assert_ne!(context.trace_id, [0; 16]);
        assert_ne!(context.span_id, [0; 8]);
        span.end();
    }

    #[test]
    fn test_carrier_parent_is_continued() {
        let provider = OtelProvider::new("orders");
        let mut carrier = HashMap::new();
        carrier.insert(
            "traceparent".to_string(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        );
        let mut baggage = BTreeMap::new();
        baggage.insert("tenant".to_string(), "acme".to_string());

        let mut span = provider.start_span(start(&Parent::Carrier(carrier), &baggage));
        let context = span.context();
        assert_eq!(context.trace_id_hex(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_ne!(context.span_id_hex(), "00f067aa0ba902b7");
        assert_eq!(context.baggage.get("tenant").map(String::as_str), Some("acme"));
        span.set_error("boom");
        span.end();
    }
}
