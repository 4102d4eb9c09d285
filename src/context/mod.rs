//! Per-invocation state and the types flowing through it.

pub mod cloudevent;
mod event;
mod out;
mod runtime;

pub use cloudevent::{CloudEvent, EventFormatError};
pub use event::{BindingEvent, TopicEvent};
pub use out::{Out, SUCCESS_BODY};
pub use runtime::{RuntimeContext, RuntimeContextBuilder};

use crate::config::Component;
use crate::http::{HttpRequest, HttpResponse};
use crate::sidecar::SidecarError;
use crate::telemetry::SpanContext;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Binding technologies that need payloads framed as structured events
/// so the pub/sub side of the same broker can parse them.
pub const STRUCTURED_BINDINGS: [&str; 7] = [
    "bindings.kafka",
    "bindings.kubemq",
    "bindings.mqtt3",
    "bindings.rabbitmq",
    "bindings.redis",
    "bindings.gcp.pubsub",
    "bindings.azure.eventhubs",
];

const INVOKE_BINDING_SOURCE: &str = "fninvoke/invokeBinding";

/// Failure of [`InvocationContext::send`].
#[derive(Debug, Error)]
pub enum SendError {
    #[error("no output")]
    NoOutputs,

    #[error("output {0} not found")]
    UnknownOutput(String),

    #[error("unsupported output type {0}")]
    UnsupportedType(String),

    #[error("output {0} is a pub/sub component without a topic")]
    MissingTopic(String),

    #[error("no sidecar client configured")]
    NoSidecar,

    #[error("cannot encode event: {0}")]
    Encode(#[from] EventFormatError),

    #[error(transparent)]
    Sidecar(#[from] SidecarError),
}

/// The event an invocation was started by.
#[derive(Debug, Clone)]
pub enum Inbound {
    Http {
        request: HttpRequest,
        response: HttpResponse,
    },
    Binding(BindingEvent),
    Topic(TopicEvent),
    CloudEvent(CloudEvent),
}

impl Inbound {
    pub fn http(request: HttpRequest) -> Self {
        Inbound::Http {
            request,
            response: HttpResponse::ok(),
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self, Inbound::Http { .. })
    }
}

/// State of one invocation, visible to the function and every
/// interceptor. Never shared between invocations.
#[derive(Debug)]
pub struct InvocationContext {
    function_name: String,
    runtime: Arc<RuntimeContext>,
    inbound: Inbound,
    out: Option<Out>,
    active_span: Option<SpanContext>,
    fields: HashMap<String, serde_json::Value>,
}

impl InvocationContext {
    pub fn new(function_name: impl Into<String>, runtime: Arc<RuntimeContext>, inbound: Inbound) -> Self {
        Self {
            function_name: function_name.into(),
            runtime,
            inbound,
            out: None,
            active_span: None,
            fields: HashMap::new(),
        }
    }

    /// Identifier of the function being run.
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Name declared in the function descriptor.
    pub fn name(&self) -> &str {
        self.runtime.function_name()
    }

    pub fn runtime(&self) -> &Arc<RuntimeContext> {
        &self.runtime
    }

    pub fn inbound(&self) -> &Inbound {
        &self.inbound
    }

    pub fn into_inbound(self) -> Inbound {
        self.inbound
    }

    pub fn http_request(&self) -> Option<&HttpRequest> {
        match &self.inbound {
            Inbound::Http { request, .. } => Some(request),
            _ => None,
        }
    }

    pub fn http_response(&self) -> Option<&HttpResponse> {
        match &self.inbound {
            Inbound::Http { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn http_response_mut(&mut self) -> Option<&mut HttpResponse> {
        match &mut self.inbound {
            Inbound::Http { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn binding_event(&self) -> Option<&BindingEvent> {
        match &self.inbound {
            Inbound::Binding(event) => Some(event),
            _ => None,
        }
    }

    pub fn topic_event(&self) -> Option<&TopicEvent> {
        match &self.inbound {
            Inbound::Topic(event) => Some(event),
            _ => None,
        }
    }

    pub fn cloud_event(&self) -> Option<&CloudEvent> {
        match &self.inbound {
            Inbound::CloudEvent(event) => Some(event),
            _ => None,
        }
    }

    /// The inbound payload as text, whatever the event kind.
    pub fn payload(&self) -> String {
        match &self.inbound {
            Inbound::Http { request, .. } => request.text().unwrap_or_default(),
            Inbound::Binding(event) => event.text(),
            Inbound::Topic(event) => event.text(),
            Inbound::CloudEvent(event) => event.data_text().unwrap_or_default(),
        }
    }

    pub fn inputs(&self) -> &BTreeMap<String, Component> {
        self.runtime.components().inputs()
    }

    pub fn outputs(&self) -> &BTreeMap<String, Component> {
        self.runtime.components().outputs()
    }

    pub fn states(&self) -> &BTreeMap<String, Component> {
        self.runtime.components().states()
    }

    pub fn out(&self) -> Option<&Out> {
        self.out.as_ref()
    }

    pub fn out_mut(&mut self) -> &mut Option<Out> {
        &mut self.out
    }

    pub fn set_out(&mut self, out: Out) {
        self.out = Some(out);
    }

    pub fn take_out(&mut self) -> Option<Out> {
        self.out.take()
    }

    /// The span currently wrapping this invocation's work, if traced.
    pub fn active_span(&self) -> Option<&SpanContext> {
        self.active_span.as_ref()
    }

    pub fn set_active_span(&mut self, span: Option<SpanContext>) {
        self.active_span = span;
    }

    /// Free-form values interceptors use to hand data to each other.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.fields.insert(key.into(), value);
    }

    /// Send `data` to the declared output `output`.
    ///
    /// Pub/sub outputs publish to their topic; binding outputs invoke
    /// their operation, framing the payload as a structured event for
    /// the technologies in [`STRUCTURED_BINDINGS`]. Every failure is
    /// returned; nothing is sent unless the output resolves.
    pub async fn send(&self, output: &str, data: impl Into<Bytes>) -> Result<(), SendError> {
        let outputs = self.outputs();
        if outputs.is_empty() {
            return Err(SendError::NoOutputs);
        }
        let component = outputs
            .get(output)
            .ok_or_else(|| SendError::UnknownOutput(output.to_string()))?;

        if !component.is_pubsub() && !component.is_binding() {
            return Err(SendError::UnsupportedType(component.component_type.clone()));
        }
        let sidecar = self.runtime.sidecar().ok_or(SendError::NoSidecar)?;
        let data = data.into();

        if component.is_pubsub() {
            let topic = component
                .topic()
                .ok_or_else(|| SendError::MissingTopic(output.to_string()))?;
            debug!("Publishing to {}/{}", component.component_name, topic);
            sidecar
                .publish(&component.component_name, topic, data, &component.metadata)
                .await?;
            return Ok(());
        }

        let payload = if STRUCTURED_BINDINGS.contains(&component.component_type.as_str()) {
            let traceparent = self.active_span.as_ref().map(SpanContext::traceparent);
            let event = CloudEvent::package(INVOKE_BINDING_SOURCE, data, traceparent);
            Bytes::from(event.to_json_bytes()?)
        } else {
            data
        };

        debug!(
            "Invoking binding {} ({})",
            component.component_name,
            component.operation()
        );
        sidecar
            .invoke_binding(
                &component.component_name,
                component.operation(),
                payload,
                &component.metadata,
            )
            .await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn for_test(function_name: &str) -> Self {
        let descriptor = crate::config::FunctionDescriptor {
            name: function_name.to_string(),
            ..Default::default()
        };
        let runtime = RuntimeContext::builder(descriptor).build();
        Self::new(function_name, Arc::new(runtime), Inbound::Binding(BindingEvent::default()))
    }
}
