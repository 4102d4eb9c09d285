//! Structured events and their JSON wire format.

use crate::http::HttpRequest;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use uuid::Uuid;

/// Content type of the structured JSON encoding.
pub const CONTENT_TYPE: &str = "application/cloudevents+json";

pub const SPEC_VERSION: &str = "1.0";

/// Type of events wrapped around payloads sent to bindings.
pub const INVOKE_EVENT_TYPE: &str = "dapr.invoke";

const TRACEPARENT: &str = "traceparent";
const TRACEID: &str = "traceid";

const ATTRIBUTES: [&str; 10] = [
    "specversion",
    "id",
    "type",
    "source",
    "schemaurl",
    "datacontenttype",
    "subject",
    "dataschema",
    "time",
    "data",
];

#[derive(Debug, Error)]
pub enum EventFormatError {
    #[error("invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event is not a JSON object")]
    NotAnObject,

    #[error("invalid event time '{0}'")]
    InvalidTime(String),

    #[error("missing required attribute '{0}'")]
    MissingAttribute(&'static str),
}

/// A CloudEvents event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEvent {
    pub id: String,
    pub source: String,
    pub specversion: String,
    pub event_type: String,
    pub datacontenttype: Option<String>,
    pub dataschema: Option<String>,
    pub subject: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub data: Option<Bytes>,
    pub extensions: BTreeMap<String, String>,
}

impl CloudEvent {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            specversion: SPEC_VERSION.to_string(),
            event_type: event_type.into(),
            datacontenttype: None,
            dataschema: None,
            subject: None,
            time: None,
            data: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.datacontenttype = Some(content_type.into());
        self.data = Some(data.into());
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// Wrap a payload bound for a binding into an invoke event.
    ///
    /// The event gets a random id and, when given, the caller's
    /// `traceparent` so the receiving side can continue the trace.
    pub fn package(source: &str, payload: impl Into<Bytes>, traceparent: Option<String>) -> Self {
        let mut event = Self::new(Uuid::new_v4().to_string(), source, INVOKE_EVENT_TYPE)
            .with_data(CONTENT_TYPE, payload);
        event.time = Some(Utc::now());
        if let Some(traceparent) = traceparent {
            event.extensions.insert(TRACEPARENT.to_string(), traceparent);
        }
        event
    }

    pub fn data_text(&self) -> Option<String> {
        self.data
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).to_string())
    }

    /// Extensions as a trace carrier.
    pub fn carrier(&self) -> HashMap<String, String> {
        self.extensions
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Structured JSON encoding.
    ///
    /// Extensions are written both at the top level and under an
    /// `extensions` object; a non-empty `traceparent` is echoed as
    /// `traceid`. Absent attributes are left out.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, EventFormatError> {
        let mut root = Map::new();
        root.insert("specversion".into(), Value::from(self.specversion.as_str()));
        root.insert("id".into(), Value::from(self.id.as_str()));
        root.insert("type".into(), Value::from(self.event_type.as_str()));
        root.insert("source".into(), Value::from(self.source.as_str()));
        insert_opt(&mut root, "datacontenttype", self.datacontenttype.as_deref());
        insert_opt(&mut root, "subject", self.subject.as_deref());
        insert_opt(&mut root, "dataschema", self.dataschema.as_deref());

        if let Some(time) = &self.time {
            root.insert(
                "time".into(),
                Value::from(time.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            );
        }
        if let Some(data) = self.data_text() {
            root.insert("data".into(), Value::from(data));
        }

        let mut extensions = Map::new();
        for (key, value) in &self.extensions {
            root.insert(key.clone(), Value::from(value.as_str()));
            extensions.insert(key.clone(), Value::from(value.as_str()));
        }
        root.insert("extensions".into(), Value::Object(extensions));

        if let Some(traceparent) = self.extensions.get(TRACEPARENT) {
            if !traceparent.is_empty() {
                root.insert(TRACEID.into(), Value::from(traceparent.as_str()));
            }
        }

        Ok(serde_json::to_vec(&Value::Object(root))?)
    }

    /// Parse the structured JSON encoding.
    ///
    /// Null fields are skipped; unknown fields become extensions. A
    /// string `data` is taken verbatim, any other JSON value is kept in
    /// its serialized form.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, EventFormatError> {
        let root: Value = serde_json::from_slice(bytes)?;
        let Value::Object(fields) = root else {
            return Err(EventFormatError::NotAnObject);
        };

        let mut event = Self::new("", "", "");
        let mut has_id = false;
        for (field, value) in fields {
            if value.is_null() {
                continue;
            }
            match field.as_str() {
                "specversion" => event.specversion = text(&value),
                "id" => {
                    event.id = text(&value);
                    has_id = true;
                }
                "source" => event.source = text(&value),
                "type" => event.event_type = text(&value),
                "datacontenttype" => event.datacontenttype = Some(text(&value)),
                "subject" => event.subject = Some(text(&value)),
                "dataschema" | "schemaurl" => event.dataschema = Some(text(&value)),
                "time" => {
                    let raw = text(&value);
                    let time = DateTime::parse_from_rfc3339(&raw)
                        .map_err(|_| EventFormatError::InvalidTime(raw.clone()))?;
                    event.time = Some(time.with_timezone(&Utc));
                }
                "data" => event.data = Some(Bytes::from(text(&value))),
                "extensions" => {
                    if let Value::Object(extensions) = value {
                        for (key, value) in extensions {
                            if !value.is_null() {
                                event.extensions.insert(key, text(&value));
                            }
                        }
                    }
                }
                _ => {
                    event.extensions.insert(field, text(&value));
                }
            }
        }

        if !has_id {
            return Err(EventFormatError::MissingAttribute("id"));
        }
        Ok(event)
    }

    /// Read an event from an HTTP request in structured or binary mode.
    ///
    /// Returns `Ok(None)` when the request carries no event at all.
    pub fn from_http(request: &HttpRequest) -> Result<Option<Self>, EventFormatError> {
        let content_type = request.content_type().unwrap_or_default();
        if content_type.starts_with(CONTENT_TYPE) {
            let body = request.body.clone().unwrap_or_default();
            return Self::from_json_bytes(&body).map(Some);
        }

        let Some(id) = request.get_header("ce-id") else {
            return Ok(None);
        };

        let header = |name: &str| request.get_header(name).cloned();
        let mut event = Self::new(
            id.clone(),
            header("ce-source").unwrap_or_default(),
            header("ce-type").unwrap_or_default(),
        );
        if let Some(version) = header("ce-specversion") {
            event.specversion = version;
        }
        event.subject = header("ce-subject");
        event.dataschema = header("ce-dataschema");
        if let Some(raw) = header("ce-time") {
            let time = DateTime::parse_from_rfc3339(&raw)
                .map_err(|_| EventFormatError::InvalidTime(raw.clone()))?;
            event.time = Some(time.with_timezone(&Utc));
        }
        if !content_type.is_empty() {
            event.datacontenttype = Some(content_type.to_string());
        }
        event.data = request.body.clone();

        for (name, value) in &request.headers {
            if let Some(key) = name.strip_prefix("ce-") {
                if !ATTRIBUTES.contains(&key) {
                    event.extensions.insert(key.to_string(), value.clone());
                }
            }
        }
        // Binary mode carries trace context in ordinary headers.
        if let Some(traceparent) = request.get_header(TRACEPARENT) {
            event
                .extensions
                .entry(TRACEPARENT.to_string())
                .or_insert_with(|| traceparent.clone());
        }

        Ok(Some(event))
    }
}

fn insert_opt(root: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        root.insert(key.to_string(), Value::from(value));
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    #[test]
    fn test_json_encoding_layout() {
        let event = CloudEvent::new("1", "orders", "order.created")
            .with_data("application/json", r#"{"id":7}"#)
            .with_extension("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01");

        let value: Value = serde_json::from_slice(&event.to_json_bytes().unwrap()).unwrap();
        assert_eq!(value["specversion"], "1.0");
        assert_eq!(value["data"], r#"{"id":7}"#);
        assert_eq!(value["traceparent"], value["extensions"]["traceparent"]);
        assert_eq!(value["traceid"], value["traceparent"]);
        assert!(value.get("subject").is_none());
    }

    #[test]
    fn test_parse_skips_nulls_and_collects_unknown_fields() {
        let raw = br#"{
            "specversion": "1.0",
            "id": "42",
            "source": "shop",
            "type": "order.created",
            "subject": null,
            "time": "2024-05-01T10:00:00Z",
            "data": {"id": 7},
            "tenant": "acme",
            "extensions": {"region": "eu"}
        }"#;
        let event = CloudEvent::from_json_bytes(raw).unwrap();
        assert_eq!(event.id, "42");
        assert_eq!(event.subject, None);
        assert_eq!(event.data_text().as_deref(), Some(r#"{"id":7}"#));
        assert_eq!(event.extensions.get("tenant").map(String::as_str), Some("acme"));
        assert_eq!(event.extensions.get("region").map(String::as_str), Some("eu"));
        assert!(event.time.is_some());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CloudEvent::from_json_bytes(b"not json").is_err());
        assert!(CloudEvent::from_json_bytes(b"[1,2]").is_err());
        assert!(CloudEvent::from_json_bytes(br#"{"source":"x"}"#).is_err());
    }

    #[test]
    fn test_binary_mode_headers() {
        let request = HttpRequest::new(Method::Post, "/")
            .header("ce-id", "9")
            .header("ce-source", "shop")
            .header("ce-type", "order.paid")
            .header("ce-specversion", "1.0")
            .header("ce-tenant", "acme")
            .header("content-type", "text/plain")
            .body("paid");

        let event = CloudEvent::from_http(&request).unwrap().unwrap();
        assert_eq!(event.event_type, "order.paid");
        assert_eq!(event.datacontenttype.as_deref(), Some("text/plain"));
        assert_eq!(event.data_text().as_deref(), Some("paid"));
        assert_eq!(event.extensions.get("tenant").map(String::as_str), Some("acme"));
    }

    #[test]
    fn test_plain_request_has_no_event() {
        let request = HttpRequest::new(Method::Post, "/").body("hi");
        assert!(CloudEvent::from_http(&request).unwrap().is_none());
    }

    #[test]
    fn test_package_sets_invoke_type_and_trace() {
        let event = CloudEvent::package("notify", "hello", Some("00-abc".to_string()));
        assert_eq!(event.event_type, INVOKE_EVENT_TYPE);
        assert!(Uuid::parse_str(&event.id).is_ok());
        assert_eq!(event.carrier().get("traceparent").map(String::as_str), Some("00-abc"));
    }
}
