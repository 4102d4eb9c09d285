//! Recording test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use fninvoke::config::FunctionDescriptor;
use fninvoke::context::{Inbound, InvocationContext, RuntimeContext};
use fninvoke::function::FunctionError;
use fninvoke::interceptor::{Interceptor, InterceptorKind, Phase};
use fninvoke::sidecar::{SidecarClient, SidecarError};
use fninvoke::telemetry::{Parent, ProviderSpan, SpanContext, SpanKind, SpanStart, TracingProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One outbound sidecar call.
#[derive(Debug, Clone, PartialEq)]
pub enum SidecarCall {
    Publish {
        pubsub_name: String,
        topic: String,
        data: Bytes,
    },
    Binding {
        name: String,
        operation: String,
        data: Bytes,
    },
}

#[derive(Default, Clone)]
pub struct RecordingSidecar {
    pub calls: Arc<Mutex<Vec<SidecarCall>>>,
}

impl RecordingSidecar {
    pub fn calls(&self) -> Vec<SidecarCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SidecarClient for RecordingSidecar {
    async fn publish(
        &self,
        pubsub_name: &str,
        topic: &str,
        data: Bytes,
        _metadata: &HashMap<String, String>,
    ) -> Result<(), SidecarError> {
        self.calls.lock().unwrap().push(SidecarCall::Publish {
            pubsub_name: pubsub_name.to_string(),
            topic: topic.to_string(),
            data,
        });
        Ok(())
    }

    async fn invoke_binding(
        &self,
        name: &str,
        operation: &str,
        data: Bytes,
        _metadata: &HashMap<String, String>,
    ) -> Result<Bytes, SidecarError> {
        self.calls.lock().unwrap().push(SidecarCall::Binding {
            name: name.to_string(),
            operation: operation.to_string(),
            data,
        });
        Ok(Bytes::new())
    }
}

/// A finished span as the recording provider saw it.
#[derive(Debug, Clone)]
pub struct Span {
    pub name: String,
    pub kind: SpanKind,
    pub attributes: Vec<(String, String)>,
    pub context: SpanContext,
    pub parent: Option<SpanContext>,
    pub error: Option<String>,
    pub ends: usize,
}

impl Span {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default, Clone)]
pub struct RecordingTracer {
    pub spans: Arc<Mutex<Vec<Span>>>,
}

impl RecordingTracer {
    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().unwrap().clone()
    }

    pub fn named(&self, name: &str) -> Span {
        self.spans()
            .into_iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("no span named {}", name))
    }
}

struct RecordedSpan {
    index: usize,
    spans: Arc<Mutex<Vec<Span>>>,
    context: SpanContext,
}

impl TracingProvider for RecordingTracer {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn start_span(&self, start: SpanStart<'_>) -> Box<dyn ProviderSpan> {
        let parent = match start.parent {
            Parent::Span(context) => Some(context.clone()),
            Parent::Carrier(carrier) => SpanContext::from_carrier(carrier),
            Parent::Root => None,
        };
        let context = parent
            .as_ref()
            .map(SpanContext::child)
            .unwrap_or_else(SpanContext::root);

        let mut spans = self.spans.lock().unwrap();
        spans.push(Span {
            name: start.name.to_string(),
            kind: start.kind,
            attributes: start.attributes.to_vec(),
            context: context.clone(),
            parent,
            error: None,
            ends: 0,
        });
        Box::new(RecordedSpan {
            index: spans.len() - 1,
            spans: self.spans.clone(),
            context,
        })
    }
}

impl ProviderSpan for RecordedSpan {
    fn context(&self) -> SpanContext {
        self.context.clone()
    }

    fn set_error(&mut self, message: &str) {
        self.spans.lock().unwrap()[self.index].error = Some(message.to_string());
    }

    fn end(&mut self) {
        self.spans.lock().unwrap()[self.index].ends += 1;
    }
}

/// Appends `{name}:{phase}` to a shared journal, optionally failing.
pub struct Journal {
    pub name: &'static str,
    pub entries: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

impl Journal {
    pub fn new(name: &'static str, entries: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            entries,
            fail: false,
        }
    }

    pub fn failing(name: &'static str, entries: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            entries,
            fail: true,
        }
    }
}

#[async_trait]
impl Interceptor for Journal {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> InterceptorKind {
        InterceptorKind::Plugin
    }

    async fn execute(&self, phase: Phase, _ctx: &mut InvocationContext) -> Result<(), FunctionError> {
        self.entries
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, phase));
        if self.fail {
            return Err(FunctionError::new(format!("{} refused", self.name)));
        }
        Ok(())
    }
}

pub fn descriptor(json: &str) -> FunctionDescriptor {
    FunctionDescriptor::from_json(json).unwrap()
}

/// A context as the event trigger would build it.
pub fn binding_context(runtime: Arc<RuntimeContext>, payload: &str) -> InvocationContext {
    let event = fninvoke::context::BindingEvent::new("orders", payload.to_string());
    InvocationContext::new(runtime.function_name().to_string(), runtime, Inbound::Binding(event))
}
