//! Event trigger: one invocation per message the broker delivers.

use crate::config::TopicSubscription;
use crate::context::{BindingEvent, Inbound, InvocationContext, RuntimeContext, TopicEvent};
use crate::function::{Function, RegistryError};
use crate::invoker;
use crate::telemetry::{Parent, SpanKind, SpanSpec};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// A delivery the broker should treat as failed and redeliver.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("no input binding named '{0}'")]
    UnknownBinding(String),

    #[error("no subscription for topic '{topic}' on '{pubsub_name}'")]
    UnknownTopic { pubsub_name: String, topic: String },

    #[error("function '{0}' panicked")]
    Panicked(String),
}

/// Dispatches broker deliveries to every configured function.
pub struct EventAdapter {
    runtime: Arc<RuntimeContext>,
    functions: Vec<(String, Function)>,
}

impl EventAdapter {
    /// Only payload functions can be driven by broker events.
    pub fn new(
        runtime: Arc<RuntimeContext>,
        functions: Vec<(String, Function)>,
    ) -> Result<Self, RegistryError> {
        for (name, function) in &functions {
            if !matches!(function, Function::Open(_)) {
                return Err(RegistryError::UnsupportedVariant {
                    name: name.clone(),
                    variant: function.variant(),
                    trigger: "event",
                });
            }
        }
        Ok(Self { runtime, functions })
    }

    /// Names of the input bindings the broker should deliver.
    pub fn list_input_bindings(&self) -> Vec<String> {
        self.runtime.components().input_bindings()
    }

    /// Topics the broker should deliver, with their routes.
    pub fn list_topic_subscriptions(&self) -> Vec<TopicSubscription> {
        self.runtime.components().topic_subscriptions()
    }

    pub async fn on_binding_event(&self, event: BindingEvent) -> Result<(), DeliveryError> {
        if !self.list_input_bindings().contains(&event.name) {
            return Err(DeliveryError::UnknownBinding(event.name));
        }
        debug!("Binding event from '{}' ({} bytes)", event.name, event.data.len());

        // Binding messages carry no trace context.
        let span = SpanSpec::new(format!("binding/{}", event.name), SpanKind::Consumer);
        self.dispatch(span, Parent::Root, Inbound::Binding(event))
            .await
    }

    pub async fn on_topic_event(&self, event: TopicEvent) -> Result<(), DeliveryError> {
        let subscribed = self
            .list_topic_subscriptions()
            .iter()
            .any(|s| s.pubsub_name == event.pubsub_name && s.topic == event.topic);
        if !subscribed {
            return Err(DeliveryError::UnknownTopic {
                pubsub_name: event.pubsub_name,
                topic: event.topic,
            });
        }
        debug!(
            "Topic event {} from '{}/{}'",
            event.event.id, event.pubsub_name, event.topic
        );

        let span = SpanSpec::new(
            format!("topic/{}/{}", event.pubsub_name, event.topic),
            SpanKind::Consumer,
        )
        .tag("event.id", event.event.id.clone());
        let carrier: HashMap<String, String> = event.carrier();
        self.dispatch(span, Parent::Carrier(carrier), Inbound::Topic(event))
            .await
    }

    async fn dispatch(
        &self,
        span: SpanSpec,
        parent: Parent,
        inbound: Inbound,
    ) -> Result<(), DeliveryError> {
        self.runtime
            .gateway()
            .execute_with_tracing(span, parent, |active| async move {
                for (name, function) in &self.functions {
                    let mut ctx =
                        InvocationContext::new(name.clone(), self.runtime.clone(), inbound.clone());
                    ctx.set_active_span(active.clone());

                    let ctx = AssertUnwindSafe(invoker::invoke(function, ctx))
                        .catch_unwind()
                        .await
                        .map_err(|_| {
                            error!("Function '{}' panicked while handling an event", name);
                            DeliveryError::Panicked(name.clone())
                        })?;

                    match ctx.out() {
                        Some(out) if out.is_error() => error!(
                            "Function '{}' failed: {}",
                            name,
                            String::from_utf8_lossy(&out.body())
                        ),
                        _ => info!("Function '{}' handled the event", name),
                    }
                }
                Ok::<(), DeliveryError>(())
            })
            .await
    }
}
