//! The function descriptor.

use super::component::{Component, ComponentRegistry};
use super::telemetry::TracingSettings;
use super::ConfigError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

const DEFAULT_PORT: u16 = 8080;
const LEGACY_SYNC_RUNTIME: &str = "Knative";
const LEGACY_ASYNC_RUNTIME: &str = "Async";

/// Declarative description of one function.
///
/// Unknown keys are ignored so descriptors written for newer runtimes
/// still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FunctionDescriptor {
    pub name: String,
    pub version: String,
    pub inputs: BTreeMap<String, Component>,
    pub outputs: BTreeMap<String, Component>,
    pub states: BTreeMap<String, Component>,
    pub triggers: Option<Triggers>,
    pub pre_hooks: Vec<String>,
    pub post_hooks: Vec<String>,
    pub tracing: Option<TracingSettings>,

    /// Legacy: "Knative" for HTTP, "Async" for event functions.
    pub runtime: Option<String>,
    /// Legacy listening port.
    #[serde(deserialize_with = "deserialize_port")]
    pub port: Option<String>,
    /// Legacy name of `preHooks`.
    pub pre_plugins: Vec<String>,
    /// Legacy name of `postHooks`.
    pub post_plugins: Vec<String>,
    /// Legacy name of `tracing`.
    pub plugins_tracing: Option<TracingSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Triggers {
    pub http: Option<HttpTrigger>,
    #[serde(rename = "dapr")]
    pub events: Vec<EventTrigger>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTrigger {
    #[serde(deserialize_with = "deserialize_port")]
    pub port: Option<String>,
    pub path: Option<String>,
}

/// A broker-delivered trigger: a binding or a pub/sub topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventTrigger {
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub topic: Option<String>,
    pub input_name: Option<String>,
}

/// The triggers a function is actually started with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerSet {
    pub http: Option<HttpTrigger>,
    pub events: BTreeMap<String, Component>,
}

impl TriggerSet {
    pub fn has_http(&self) -> bool {
        self.http.is_some()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_http() && !self.has_events()
    }
}

impl FunctionDescriptor {
    /// Parse and validate a JSON descriptor.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let descriptor: FunctionDescriptor = serde_json::from_str(json)?;
        descriptor.validate()?;
        debug!(
            "Loaded descriptor for function '{}' ({} inputs, {} outputs, {} states)",
            descriptor.name,
            descriptor.inputs.len(),
            descriptor.outputs.len(),
            descriptor.states.len()
        );
        Ok(descriptor)
    }

    /// Check the fields a runtime cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingName);
        }
        if self.triggers().is_empty() {
            return Err(ConfigError::MissingTrigger(self.name.clone()));
        }
        self.port()?;
        Ok(())
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

    /// Resolve declared triggers, honouring the legacy `runtime` key when
    /// no `triggers` section is present.
    pub fn triggers(&self) -> TriggerSet {
        if let Some(triggers) = &self.triggers {
            let events = triggers
                .events
                .iter()
                .map(|trigger| {
                    let mut component =
                        Component::new(trigger.name.clone(), trigger.component_type.clone());
                    component.topic = trigger.topic.clone();
                    (trigger.name.clone(), component)
                })
                .collect();
            return TriggerSet {
                http: triggers.http.clone(),
                events,
            };
        }

        match self.runtime.as_deref() {
            Some(LEGACY_SYNC_RUNTIME) => TriggerSet {
                http: Some(HttpTrigger {
                    port: self.port.clone(),
                    path: None,
                }),
                events: BTreeMap::new(),
            },
            Some(LEGACY_ASYNC_RUNTIME) => TriggerSet {
                http: None,
                events: self.inputs.clone(),
            },
            _ => TriggerSet::default(),
        }
    }

    pub fn pre_hooks(&self) -> &[String] {
        if self.pre_hooks.is_empty() {
            &self.pre_plugins
        } else {
            &self.pre_hooks
        }
    }

    pub fn post_hooks(&self) -> &[String] {
        if self.post_hooks.is_empty() {
            &self.post_plugins
        } else {
            &self.post_hooks
        }
    }

    pub fn tracing_settings(&self) -> Option<&TracingSettings> {
        self.tracing.as_ref().or(self.plugins_tracing.as_ref())
    }

    pub fn is_tracing_enabled(&self) -> bool {
        self.tracing_settings().is_some_and(|t| t.enabled)
    }

    /// Listening port: the HTTP trigger's, then the legacy key, then 8080.
    pub fn port(&self) -> Result<u16, ConfigError> {
        let declared = self
            .triggers
            .as_ref()
            .and_then(|t| t.http.as_ref())
            .and_then(|h| h.port.clone())
            .or_else(|| self.port.clone());

        match declared {
            None => Ok(DEFAULT_PORT),
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone())),
        }
    }

    /// Path the HTTP trigger serves, `/` unless declared.
    pub fn http_path(&self) -> String {
        self.triggers()
            .http
            .and_then(|h| h.path)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string())
    }

    /// Whether any component is declared, i.e. whether a sidecar is needed.
    pub fn needs_sidecar(&self) -> bool {
        !(self.inputs.is_empty() && self.outputs.is_empty() && self.states.is_empty())
    }

    /// Build the read-only component view handed to every invocation.
    pub fn component_registry(&self) -> ComponentRegistry {
        ComponentRegistry::new(
            self.inputs.clone(),
            self.outputs.clone(),
            self.states.clone(),
            self.triggers().events,
        )
    }
}

/// Ports show up both as strings and as numbers.
fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Port>::deserialize(deserializer)? {
        Some(Port::Number(n)) => Some(n.to_string()),
        Some(Port::Text(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"{
        "name": "order-handler",
        "version": "v2",
        "inputs": {
            "orders": {"componentName": "orders", "componentType": "bindings.kafka"}
        },
        "outputs": {
            "notify": {"componentName": "redis", "componentType": "pubsub.redis", "topic": "events"}
        },
        "triggers": {
            "http": {"port": 9090},
            "dapr": [{"name": "orders", "type": "bindings.kafka"}]
        },
        "preHooks": ["audit", "metrics"],
        "postHooks": ["metrics"],
        "somethingNew": {"ignored": true}
    }"#;

    #[test]
    fn test_parse_descriptor() {
        let descriptor = FunctionDescriptor::from_json(DESCRIPTOR).unwrap();
        assert_eq!(descriptor.name, "order-handler");
        assert_eq!(descriptor.version, "v2");
        assert_eq!(descriptor.port().unwrap(), 9090);
        assert_eq!(descriptor.pre_hooks(), ["audit", "metrics"]);
        assert_eq!(descriptor.post_hooks(), ["metrics"]);
        assert!(!descriptor.is_tracing_enabled());
        assert!(descriptor.needs_sidecar());

        let triggers = descriptor.triggers();
        assert!(triggers.has_http());
        assert!(triggers.events["orders"].is_binding());
    }

    #[test]
    fn test_missing_trigger_is_fatal() {
        let result = FunctionDescriptor::from_json(r#"{"name": "lonely"}"#);
        assert!(matches!(result, Err(ConfigError::MissingTrigger(name)) if name == "lonely"));
    }

    #[test]
    fn test_missing_name_is_fatal() {
        let result = FunctionDescriptor::from_json(r#"{"runtime": "Knative"}"#);
        assert!(matches!(result, Err(ConfigError::MissingName)));
    }

    #[test]
    fn test_malformed_json_is_fatal() {
        let result = FunctionDescriptor::from_json("{not json");
        assert!(matches!(result, Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn test_invalid_port() {
        let result = FunctionDescriptor::from_json(
            r#"{"name": "f", "triggers": {"http": {"port": "eighty"}}}"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidPort(p)) if p == "eighty"));
    }

    #[test]
    fn test_legacy_keys() {
        let descriptor = FunctionDescriptor::from_json(
            r#"{
                "name": "legacy",
                "runtime": "Async",
                "port": "50002",
                "inputs": {"in": {"componentName": "cron", "componentType": "bindings.cron"}},
                "prePlugins": ["old-plugin"],
                "pluginsTracing": {"enabled": true, "provider": {"name": "log"}}
            }"#,
        )
        .unwrap();

        assert_eq!(descriptor.port().unwrap(), 50002);
        assert_eq!(descriptor.pre_hooks(), ["old-plugin"]);
        assert!(descriptor.post_hooks().is_empty());
        assert!(descriptor.is_tracing_enabled());

        let triggers = descriptor.triggers();
        assert!(!triggers.has_http());
        assert_eq!(triggers.events["in"].component_name, "cron");
    }

    #[test]
    fn test_legacy_sync_runtime_is_http() {
        let descriptor =
            FunctionDescriptor::from_json(r#"{"name": "web", "runtime": "Knative"}"#).unwrap();
        assert!(descriptor.triggers().has_http());
        assert_eq!(descriptor.port().unwrap(), 8080);
        assert_eq!(descriptor.http_path(), "/");
    }

    #[test]
    fn test_component_registry_from_triggers() {
        let descriptor = FunctionDescriptor::from_json(DESCRIPTOR).unwrap();
        let registry = descriptor.component_registry();
        assert_eq!(registry.input_bindings(), vec!["orders".to_string()]);
        assert!(registry.topic_subscriptions().is_empty());
        assert!(registry.output("notify").unwrap().is_pubsub());
    }
}
