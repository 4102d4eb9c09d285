//! The app channel the sidecar calls to deliver events.
//!
//! Routes:
//! - `GET /dapr/subscribe` lists topic subscriptions
//! - `OPTIONS /{binding}` answers 200 for bindings this app consumes
//! - `POST /{binding}` delivers a binding message
//! - `POST /{pubsub}/{topic}` delivers a structured topic event

use super::event::EventAdapter;
use super::listener::Handler;
use crate::context::{BindingEvent, CloudEvent, TopicEvent};
use crate::http::{HttpRequest, HttpResponse, Method, StatusCode};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

const SUBSCRIBE_PATH: &str = "/dapr/subscribe";

#[derive(Debug, Serialize)]
struct Subscription {
    pubsubname: String,
    topic: String,
    route: String,
}

#[derive(Debug, Serialize)]
struct Ack {
    status: &'static str,
}

/// HTTP face of the [`EventAdapter`].
pub struct CallbackServer {
    adapter: Arc<EventAdapter>,
}

impl CallbackServer {
    pub fn new(adapter: Arc<EventAdapter>) -> Self {
        Self { adapter }
    }

    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        if request.path == SUBSCRIBE_PATH {
            return match request.method {
                Method::Get => self.subscriptions(),
                _ => HttpResponse::error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
            };
        }

        let segments: Vec<&str> = request
            .path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match (&request.method, segments.as_slice()) {
            (Method::Options, [binding]) => {
                if self.adapter.list_input_bindings().iter().any(|b| b == binding) {
                    HttpResponse::ok()
                } else {
                    HttpResponse::error(StatusCode::NOT_FOUND, "Not Found")
                }
            }
            (Method::Post, [binding]) => {
                let binding = binding.to_string();
                self.binding_event(binding, &request).await
            }
            (Method::Post, [pubsub_name, topic]) => {
                let (pubsub_name, topic) = (pubsub_name.to_string(), topic.to_string());
                self.topic_event(pubsub_name, topic, &request).await
            }
            _ => HttpResponse::error(StatusCode::NOT_FOUND, "Not Found"),
        }
    }

    fn subscriptions(&self) -> HttpResponse {
        let subscriptions: Vec<Subscription> = self
            .adapter
            .list_topic_subscriptions()
            .into_iter()
            .map(|s| Subscription {
                route: s.route(),
                pubsubname: s.pubsub_name,
                topic: s.topic,
            })
            .collect();
        debug!("Advertising {} topic subscriptions", subscriptions.len());
        json_response(&subscriptions)
    }

    async fn binding_event(&self, name: String, request: &HttpRequest) -> HttpResponse {
        let mut event = BindingEvent::new(name, request.body.clone().unwrap_or_default());
        event.metadata = request.headers.clone();

        match self.adapter.on_binding_event(event).await {
            Ok(()) => HttpResponse::ok(),
            Err(err) => {
                error!("Binding delivery failed: {}", err);
                HttpResponse::error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }

    async fn topic_event(&self, pubsub_name: String, topic: String, request: &HttpRequest) -> HttpResponse {
        let body = request.body.clone().unwrap_or_default();
        let event = match CloudEvent::from_json_bytes(&body) {
            Ok(event) => event,
            Err(err) => {
                // Redelivering an unparseable event cannot help.
                warn!("Dropping malformed topic event: {}", err);
                return json_response(&Ack { status: "DROP" });
            }
        };

        match self
            .adapter
            .on_topic_event(TopicEvent::new(pubsub_name, topic, event))
            .await
        {
            Ok(()) => json_response(&Ack { status: "SUCCESS" }),
            Err(err) => {
                error!("Topic delivery failed: {}", err);
                HttpResponse::error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }
}

#[async_trait]
impl Handler for CallbackServer {
    async fn handle(&self, request: HttpRequest) -> HttpResponse {
        CallbackServer::handle(self, request).await
    }
}

fn json_response<T: Serialize>(value: &T) -> HttpResponse {
    HttpResponse::json(value).unwrap_or_else(|err| {
        error!("Cannot encode response: {}", err);
        HttpResponse::error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    })
}
