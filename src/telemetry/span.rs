//! Backend-agnostic span values passed explicitly through invocations.

use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

const TRACEPARENT: &str = "traceparent";
const TRACEPARENT_VERSION: &str = "00";

/// Identity of an active span plus the baggage travelling with it.
///
/// Invocations carry this value instead of relying on an ambient
/// "current span": whoever opens a child span gets it handed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanContext {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub sampled: bool,
    pub baggage: BTreeMap<String, String>,
}

impl SpanContext {
    /// A fresh context starting a new trace.
    pub fn root() -> Self {
        Self {
            trace_id: Uuid::new_v4().into_bytes(),
            span_id: random_span_id(),
            sampled: true,
            baggage: BTreeMap::new(),
        }
    }

    /// A new span in the same trace, inheriting the baggage.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: random_span_id(),
            sampled: self.sampled,
            baggage: self.baggage.clone(),
        }
    }

    pub fn with_baggage(mut self, baggage: BTreeMap<String, String>) -> Self {
        self.baggage.extend(baggage);
        self
    }

    pub fn trace_id_hex(&self) -> String {
        to_hex(&self.trace_id)
    }

    pub fn span_id_hex(&self) -> String {
        to_hex(&self.span_id)
    }

    /// W3C `traceparent` header value.
    pub fn traceparent(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            TRACEPARENT_VERSION,
            self.trace_id_hex(),
            self.span_id_hex(),
            if self.sampled { "01" } else { "00" }
        )
    }

    /// Parse a W3C `traceparent` value. All-zero ids are invalid.
    pub fn from_traceparent(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;

        if version.len() != 2 || version == "ff" {
            return None;
        }

        let trace_id: [u8; 16] = from_hex(trace_id)?.try_into().ok()?;
        let span_id: [u8; 8] = from_hex(span_id)?.try_into().ok()?;
        let flags = u8::from_str_radix(flags, 16).ok()?;

        if trace_id == [0; 16] || span_id == [0; 8] {
            return None;
        }

        Some(Self {
            trace_id,
            span_id,
            sampled: flags & 0x01 == 0x01,
            baggage: BTreeMap::new(),
        })
    }

    /// Find a `traceparent` entry in a header or extension map.
    pub fn from_carrier(carrier: &HashMap<String, String>) -> Option<Self> {
        carrier
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(TRACEPARENT))
            .and_then(|(_, value)| Self::from_traceparent(value))
    }
}

fn random_span_id() -> [u8; 8] {
    let bytes = Uuid::new_v4().into_bytes();
    let mut span_id = [0u8; 8];
    span_id.copy_from_slice(&bytes[8..]);
    span_id
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn from_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}

/// Role of a span relative to the work it wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Server,
    Client,
    Producer,
    Consumer,
    Internal,
}

/// Where a new span takes its parent from.
#[derive(Debug, Clone, Default)]
pub enum Parent {
    /// Start a new trace.
    #[default]
    Root,
    /// Extract the parent from HTTP headers or event extensions; a
    /// carrier without a recognizable trace header starts a new trace.
    Carrier(HashMap<String, String>),
    /// Child of a span already active in this invocation.
    Span(SpanContext),
}

impl Parent {
    /// Child of `span` when there is one, a new trace otherwise.
    pub fn from_active(span: Option<&SpanContext>) -> Self {
        span.cloned().map(Parent::Span).unwrap_or_default()
    }
}

/// Name, kind and tags of a span about to be opened.
#[derive(Debug, Clone)]
pub struct SpanSpec {
    pub name: String,
    pub kind: SpanKind,
    pub tags: Vec<(String, String)>,
}

impl SpanSpec {
    pub fn new(name: impl Into<String>, kind: SpanKind) -> Self {
        Self {
            name: name.into(),
            kind,
            tags: Vec::new(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}
