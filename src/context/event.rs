//! Events delivered by the sidecar to the app callback.

use super::cloudevent::CloudEvent;
use bytes::Bytes;
use std::collections::HashMap;

/// A message arriving from an input binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingEvent {
    pub name: String,
    pub metadata: HashMap<String, String>,
    pub data: Bytes,
}

impl BindingEvent {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            metadata: HashMap::new(),
            data: data.into(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).to_string()
    }
}

/// A message arriving from a pub/sub topic subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicEvent {
    pub pubsub_name: String,
    pub topic: String,
    pub event: CloudEvent,
}

impl TopicEvent {
    pub fn new(pubsub_name: impl Into<String>, topic: impl Into<String>, event: CloudEvent) -> Self {
        Self {
            pubsub_name: pubsub_name.into(),
            topic: topic.into(),
            event,
        }
    }

    pub fn text(&self) -> String {
        self.event.data_text().unwrap_or_default()
    }

    /// Event extensions, used to continue the publisher's trace.
    pub fn carrier(&self) -> HashMap<String, String> {
        self.event.carrier()
    }
}
