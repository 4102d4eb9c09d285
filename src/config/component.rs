//! Component records: named pub/sub, binding and state targets.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const PUBSUB_PREFIX: &str = "pubsub";
const BINDING_PREFIX: &str = "bindings";
const STATE_PREFIX: &str = "state";

/// What a component routes to, selected by the prefix of its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    PubSub,
    Binding,
    State,
}

impl ComponentKind {
    /// Classify a dotted component type such as `pubsub.redis` or
    /// `bindings.kafka`. Anything else is not recognized.
    pub fn classify(component_type: &str) -> Option<Self> {
        if component_type.starts_with(PUBSUB_PREFIX) {
            Some(ComponentKind::PubSub)
        } else if component_type.starts_with(BINDING_PREFIX) {
            Some(ComponentKind::Binding)
        } else if component_type.starts_with(STATE_PREFIX) {
            Some(ComponentKind::State)
        } else {
            None
        }
    }
}

/// A named routing target at the sidecar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Component {
    /// Routing target name at the sidecar.
    pub component_name: String,
    /// Dotted type, e.g. `pubsub.redis.v1`.
    pub component_type: String,
    /// Topic, meaningful for pub/sub components only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Operation, meaningful for binding components only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Opaque metadata passed through to the sidecar.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    /// Older descriptors carried the topic here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl Component {
    pub fn new(component_name: impl Into<String>, component_type: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            component_type: component_type.into(),
            ..Default::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> Option<ComponentKind> {
        ComponentKind::classify(&self.component_type)
    }

    pub fn is_pubsub(&self) -> bool {
        self.kind() == Some(ComponentKind::PubSub)
    }

    pub fn is_binding(&self) -> bool {
        self.kind() == Some(ComponentKind::Binding)
    }

    pub fn is_state(&self) -> bool {
        self.kind() == Some(ComponentKind::State)
    }

    /// The topic of a pub/sub component. Falls back to the legacy `uri`
    /// unless it merely repeats the component name.
    pub fn topic(&self) -> Option<&str> {
        match self.topic.as_deref() {
            Some(topic) if !topic.trim().is_empty() => Some(topic),
            _ => self
                .uri
                .as_deref()
                .filter(|uri| !uri.trim().is_empty() && *uri != self.component_name),
        }
    }

    /// The binding operation, `create` when none is declared.
    pub fn operation(&self) -> &str {
        self.operation
            .as_deref()
            .filter(|op| !op.is_empty())
            .unwrap_or("create")
    }
}

/// A topic the event adapter asks the broker to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSubscription {
    pub pubsub_name: String,
    pub topic: String,
}

impl TopicSubscription {
    /// Path the broker posts this subscription's events to over HTTP.
    pub fn route(&self) -> String {
        format!("/{}/{}", self.pubsub_name, self.topic)
    }
}

/// Read-only view of every component a function declares, plus the
/// components its event trigger listens on.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    inputs: BTreeMap<String, Component>,
    outputs: BTreeMap<String, Component>,
    states: BTreeMap<String, Component>,
    event_triggers: BTreeMap<String, Component>,
}

impl ComponentRegistry {
    pub fn new(
        inputs: BTreeMap<String, Component>,
        outputs: BTreeMap<String, Component>,
        states: BTreeMap<String, Component>,
        event_triggers: BTreeMap<String, Component>,
    ) -> Self {
        Self {
            inputs,
            outputs,
            states,
            event_triggers,
        }
    }

    pub fn inputs(&self) -> &BTreeMap<String, Component> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<String, Component> {
        &self.outputs
    }

    pub fn states(&self) -> &BTreeMap<String, Component> {
        &self.states
    }

    pub fn event_triggers(&self) -> &BTreeMap<String, Component> {
        &self.event_triggers
    }

    pub fn output(&self, name: &str) -> Option<&Component> {
        self.outputs.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty() && self.states.is_empty()
    }

    /// Component names of every binding the event trigger listens on.
    pub fn input_bindings(&self) -> Vec<String> {
        self.event_triggers
            .values()
            .filter(|c| c.is_binding())
            .map(|c| c.component_name.clone())
            .collect()
    }

    /// Every pub/sub topic the event trigger subscribes to. Pub/sub
    /// triggers without a topic cannot be subscribed and are skipped.
    pub fn topic_subscriptions(&self) -> Vec<TopicSubscription> {
        self.event_triggers
            .values()
            .filter(|c| c.is_pubsub())
            .filter_map(|c| {
                c.topic().map(|topic| TopicSubscription {
                    pubsub_name: c.component_name.clone(),
                    topic: topic.to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_is_a_prefix_test() {
        assert!(Component::new("a", "pubsub.redis.v1").is_pubsub());
        assert!(Component::new("b", "bindings.kafka").is_binding());
        assert!(!Component::new("c", "state.redis").is_pubsub());
        assert!(Component::new("c", "state.redis").is_state());
        assert_eq!(ComponentKind::classify("queue.sqs"), None);
    }

    #[test]
    fn test_topic_falls_back_to_uri() {
        let mut component = Component::new("redis", "pubsub.redis");
        component.uri = Some("orders".to_string());
        assert_eq!(component.topic(), Some("orders"));

        component.uri = Some("redis".to_string());
        assert_eq!(component.topic(), None);

        let component = component.with_topic("events");
        assert_eq!(component.topic(), Some("events"));
    }

    #[test]
    fn test_operation_defaults_to_create() {
        assert_eq!(Component::new("k", "bindings.kafka").operation(), "create");
        assert_eq!(
            Component::new("k", "bindings.kafka").with_operation("get").operation(),
            "get"
        );
    }

    #[test]
    fn test_listings_split_by_kind() {
        let mut triggers = BTreeMap::new();
        triggers.insert("orders".to_string(), Component::new("orders", "bindings.kafka"));
        triggers.insert(
            "notify".to_string(),
            Component::new("notify", "pubsub.redis").with_topic("events"),
        );
        triggers.insert("untopiced".to_string(), Component::new("p", "pubsub.redis"));

        let registry = ComponentRegistry::new(
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            triggers,
        );

        assert_eq!(registry.input_bindings(), vec!["orders".to_string()]);
        let subscriptions = registry.topic_subscriptions();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].pubsub_name, "notify");
        assert_eq!(subscriptions[0].topic, "events");
        assert_eq!(subscriptions[0].route(), "/notify/events");
    }

    #[test]
    fn test_component_deserializes_camel_case() {
        let component: Component = serde_json::from_str(
            r#"{"componentName":"kafka","componentType":"bindings.kafka","operation":"create","metadata":{"k":"v"},"extra":1}"#,
        )
        .unwrap();
        assert_eq!(component.component_name, "kafka");
        assert!(component.is_binding());
        assert_eq!(component.metadata.get("k").map(String::as_str), Some("v"));
    }
}
