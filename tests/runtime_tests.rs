//! End-to-end tests: the runtime bound on ephemeral ports.

mod common;

use bytes::Bytes;
use common::{RecordingSidecar, SidecarCall};
use fninvoke::prelude::*;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

async fn call(method: hyper::Method, addr: SocketAddr, path: &str, body: &str) -> (u16, String) {
    call_with_headers(method, addr, path, &[("content-type", "text/plain")], body).await
}

async fn call_with_headers(
    method: hyper::Method,
    addr: SocketAddr,
    path: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> (u16, String) {
    let client: Client<HttpConnector, Full<Bytes>> = Client::builder(TokioExecutor::new()).build_http();
    let mut request = Request::builder()
        .method(method)
        .uri(format!("http://{}{}", addr, path));
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let request = request
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap();
    let response = client.request(request).await.unwrap();
    let status = response.status().as_u16();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

struct Echo;

#[async_trait]
impl OpenFunction for Echo {
    async fn accept(&self, _ctx: &mut InvocationContext, payload: &str) -> Result<Option<Out>, FunctionError> {
        if payload.is_empty() {
            return Err(FunctionError::bad_request("empty payload"));
        }
        Ok(Some(Out::ok(payload.to_string()).with_metadata("x-echo", "1")))
    }
}

/// Forwards every order to the `notify` output.
struct Forward;

#[async_trait]
impl OpenFunction for Forward {
    async fn accept(&self, ctx: &mut InvocationContext, payload: &str) -> Result<Option<Out>, FunctionError> {
        ctx.send("notify", payload.to_string())
            .await
            .map_err(|e| FunctionError::new(e.to_string()))?;
        Ok(None)
    }
}

/// Panics on the payload `boom`.
struct Fragile;

#[async_trait]
impl OpenFunction for Fragile {
    async fn accept(&self, _ctx: &mut InvocationContext, payload: &str) -> Result<Option<Out>, FunctionError> {
        if payload == "boom" {
            panic!("fragile function blew up");
        }
        Ok(Some(Out::ok("survived")))
    }
}

/// Records `{id}|{type}|{data}` for every event it receives.
#[derive(Default, Clone)]
struct EventLog(Arc<Mutex<Vec<String>>>);

#[async_trait]
impl CloudEventFunction for EventLog {
    async fn accept(&self, _ctx: &mut InvocationContext, event: &CloudEvent) -> Result<(), FunctionError> {
        self.0.lock().unwrap().push(format!(
            "{}|{}|{}",
            event.id,
            event.event_type,
            event.data_text().unwrap_or_default()
        ));
        Ok(())
    }
}

async fn serve_http(name: &str, function: Function) -> SocketAddr {
    let config = RuntimeConfig::new(
        name,
        format!(r#"{{"name": "{}", "triggers": {{"http": {{"port": 0}}}}}}"#, name),
    )
    .host("127.0.0.1");
    let runtime = Runtime::new(config);
    runtime.register_function(name, function).await.unwrap();
    let started = runtime.start().await.unwrap();
    let addr = started.http_addr().unwrap();
    tokio::spawn(started.serve());
    addr
}

static POST_ONLY: [Method; 1] = [Method::Post];

struct Hello;

#[async_trait]
impl HttpFunction for Hello {
    async fn service(&self, ctx: &mut InvocationContext) -> Result<(), FunctionError> {
        let response = ctx.http_response_mut().unwrap();
        response.set_status(201);
        response.write("created");
        Ok(())
    }

    fn methods(&self) -> &[Method] {
        &POST_ONLY
    }
}

#[tokio::test]
async fn test_http_round_trip() {
    let config = RuntimeConfig::new(
        "echo",
        r#"{"name": "echo", "triggers": {"http": {"port": 0, "path": "/echo"}}}"#,
    )
    .host("127.0.0.1");
    let runtime = Runtime::new(config);
    runtime.register_function("echo", Function::open(Echo)).await.unwrap();

    let started = runtime.start().await.unwrap();
    assert!(started.callback_addr().is_none());
    let addr = started.http_addr().unwrap();
    tokio::spawn(started.serve());

    let client: Client<HttpConnector, Full<Bytes>> = Client::builder(TokioExecutor::new()).build_http();
    let request = Request::builder()
        .method(hyper::Method::POST)
        .uri(format!("http://{}/echo", addr))
        .body(Full::new(Bytes::from("ping")))
        .unwrap();
    let response = client.request(request).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.headers().get("x-echo").unwrap(), "1");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "ping");

    // Errors are normalized to 500 carrying the message.
    assert_eq!(
        call(hyper::Method::POST, addr, "/echo", "").await,
        (500, "empty payload".to_string())
    );
    assert_eq!(call(hyper::Method::GET, addr, "/other", "x").await.0, 404);
}

#[tokio::test]
async fn test_raw_http_function_owns_the_response() {
    let config = RuntimeConfig::new("hello", r#"{"name": "hello", "triggers": {"http": {"port": 0}}}"#)
        .host("127.0.0.1");
    let runtime = Runtime::new(config);
    runtime.register_function("hello", Function::http(Hello)).await.unwrap();

    let started = runtime.start().await.unwrap();
    let addr = started.http_addr().unwrap();
    tokio::spawn(started.serve());

    assert_eq!(
        call(hyper::Method::POST, addr, "/", "").await,
        (201, "created".to_string())
    );
    assert_eq!(call(hyper::Method::GET, addr, "/", "").await.0, 405);
}

#[tokio::test]
async fn test_binding_event_publishes_to_output() {
    let config = RuntimeConfig::new(
        "forward",
        r#"{
            "name": "orders",
            "triggers": {"dapr": [
                {"name": "orders", "type": "bindings.kafka"},
                {"name": "shop", "type": "pubsub.redis", "topic": "placed"}
            ]},
            "outputs": {
                "notify": {"componentName": "notify", "componentType": "pubsub.redis", "topic": "alerts"}
            }
        }"#,
    )
    .host("127.0.0.1")
    .callback_port(0);
    let sidecar = RecordingSidecar::default();
    let runtime = Runtime::new(config).sidecar(Arc::new(sidecar.clone()));
    runtime.register_function("forward", Function::open(Forward)).await.unwrap();

    let started = runtime.start().await.unwrap();
    assert!(started.http_addr().is_none());
    let addr = started.callback_addr().unwrap();
    tokio::spawn(started.serve());

    let (status, listed) = call(hyper::Method::GET, addr, "/dapr/subscribe", "").await;
    assert_eq!(status, 200);
    let listed: serde_json::Value = serde_json::from_str(&listed).unwrap();
    assert_eq!(
        listed,
        serde_json::json!([{"pubsubname": "shop", "topic": "placed", "route": "/shop/placed"}])
    );

    assert_eq!(call(hyper::Method::OPTIONS, addr, "/orders", "").await.0, 200);
    assert_eq!(call(hyper::Method::POST, addr, "/orders", r#"{"id":7}"#).await.0, 200);

    let event = r#"{"specversion":"1.0","id":"e1","source":"shop","type":"order.placed","data":"second"}"#;
    let (status, ack) = call(hyper::Method::POST, addr, "/shop/placed", event).await;
    assert_eq!((status, ack.as_str()), (200, r#"{"status":"SUCCESS"}"#));

    assert_eq!(
        sidecar.calls(),
        [
            SidecarCall::Publish {
                pubsub_name: "notify".to_string(),
                topic: "alerts".to_string(),
                data: Bytes::from(r#"{"id":7}"#),
            },
            SidecarCall::Publish {
                pubsub_name: "notify".to_string(),
                topic: "alerts".to_string(),
                data: Bytes::from("second"),
            },
        ]
    );
}

#[tokio::test]
async fn test_event_trigger_rejects_raw_http_functions() {
    let config = RuntimeConfig::new(
        "hello",
        r#"{"name": "hello", "triggers": {"dapr": [{"name": "orders", "type": "bindings.kafka"}]}}"#,
    )
    .host("127.0.0.1")
    .callback_port(0);
    let runtime = Runtime::new(config);
    runtime.register_function("hello", Function::http(Hello)).await.unwrap();

    let err = runtime.start().await.err().unwrap();
    assert!(matches!(err, fninvoke::RuntimeError::Registry(_)));
}

#[tokio::test]
async fn test_panicking_function_answers_500_and_keeps_serving() {
    let addr = serve_http("fragile", Function::open(Fragile)).await;

    let (status, _) = call(hyper::Method::POST, addr, "/", "boom").await;
    assert_eq!(status, 500);
    assert_eq!(
        call(hyper::Method::POST, addr, "/", "again").await,
        (200, "survived".to_string())
    );
}

#[tokio::test]
async fn test_structured_cloud_event_over_http() {
    let log = EventLog::default();
    let addr = serve_http("events", Function::cloud_event(log.clone())).await;

    let event = r#"{"specversion":"1.0","id":"e1","source":"shop","type":"order.placed","data":"hello"}"#;
    let (status, body) = call_with_headers(
        hyper::Method::POST,
        addr,
        "/",
        &[("content-type", "application/cloudevents+json")],
        event,
    )
    .await;
    assert_eq!((status, body.as_str()), (200, "Success"));
    assert_eq!(*log.0.lock().unwrap(), ["e1|order.placed|hello"]);
}

#[tokio::test]
async fn test_binary_cloud_event_over_http() {
    let log = EventLog::default();
    let addr = serve_http("events", Function::cloud_event(log.clone())).await;

    let headers = [
        ("content-type", "text/plain"),
        ("ce-id", "e2"),
        ("ce-source", "shop"),
        ("ce-type", "order.shipped"),
        ("ce-specversion", "1.0"),
    ];
    let (status, _) = call_with_headers(hyper::Method::POST, addr, "/", &headers, "parcel").await;
    assert_eq!(status, 200);
    assert_eq!(*log.0.lock().unwrap(), ["e2|order.shipped|parcel"]);
}

#[tokio::test]
async fn test_malformed_cloud_event_answers_500() {
    let log = EventLog::default();
    let addr = serve_http("events", Function::cloud_event(log.clone())).await;

    let (status, _) = call_with_headers(
        hyper::Method::POST,
        addr,
        "/",
        &[("content-type", "application/cloudevents+json")],
        "not an event",
    )
    .await;
    assert_eq!(status, 500);

    // A plain request carries no event at all.
    assert_eq!(call(hyper::Method::POST, addr, "/", "plain").await.0, 500);
    assert!(log.0.lock().unwrap().is_empty());
}
