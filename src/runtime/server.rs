//! Runtime wiring: descriptor in, listening triggers out.

use super::{RuntimeConfig, RuntimeError};
use crate::config::{ConfigError, FunctionDescriptor};
use crate::context::RuntimeContext;
use crate::function::{Function, FunctionRegistry, RegistryError};
use crate::interceptor::{InterceptorRegistry, Pipeline};
use crate::sidecar::{DaprHttpClient, SidecarClient};
use crate::telemetry::{TracingGateway, TracingProvider};
use crate::trigger::{CallbackServer, EventAdapter, Handler, HttpAdapter, Listener};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SIDECAR_HOST: &str = "127.0.0.1";
const TAG_INSTANCE: &str = "instance";
const TAG_NAMESPACE: &str = "namespace";

/// The function runtime.
///
/// Functions and interceptors are registered up front; [`Runtime::start`]
/// then reads the descriptor, resolves the function target and binds one
/// listener per declared trigger.
pub struct Runtime {
    config: RuntimeConfig,
    functions: Arc<FunctionRegistry>,
    interceptors: InterceptorRegistry,
    sidecar: Option<Arc<dyn SidecarClient>>,
    tracing_provider: Option<Arc<dyn TracingProvider>>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            functions: Arc::new(FunctionRegistry::new()),
            interceptors: InterceptorRegistry::new(),
            sidecar: None,
            tracing_provider: None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get the function registry.
    pub fn functions(&self) -> Arc<FunctionRegistry> {
        self.functions.clone()
    }

    /// Register a function with the runtime.
    pub async fn register_function(
        &self,
        name: impl Into<String>,
        function: Function,
    ) -> Result<(), RegistryError> {
        self.functions.register(name, function).await
    }

    /// Use `interceptors` to resolve the descriptor's hook identifiers.
    pub fn interceptors(mut self, interceptors: InterceptorRegistry) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Talk to this client instead of building one from the sidecar port.
    pub fn sidecar(mut self, sidecar: Arc<dyn SidecarClient>) -> Self {
        self.sidecar = Some(sidecar);
        self
    }

    /// Back enabled tracing with a host-configured provider, e.g. an
    /// OpenTelemetry provider wired to an exporter.
    pub fn tracing_provider(mut self, provider: Arc<dyn TracingProvider>) -> Self {
        self.tracing_provider = Some(provider);
        self
    }

    /// Start and serve until a listener fails.
    pub async fn run(self) -> Result<(), RuntimeError> {
        self.start().await?.serve().await
    }

    /// Build the shared runtime context and bind the trigger listeners.
    pub async fn start(self) -> Result<StartedRuntime, RuntimeError> {
        let descriptor = FunctionDescriptor::from_json(&self.config.function_context)?;
        let triggers = descriptor.triggers();
        if triggers.is_empty() {
            return Err(ConfigError::MissingTrigger(descriptor.name.clone()).into());
        }
        let gateway = self.gateway(&descriptor)?;
        if let Some(provider) = gateway.provider_name() {
            info!("Tracing enabled with the {} provider", provider);
        }

        let targets = self
            .functions
            .resolve_targets(&self.config.function_target)
            .await?;
        info!(
            "Starting function '{}' with {} target(s)",
            descriptor.name,
            targets.len()
        );

        let pipeline = Pipeline::new(
            self.interceptors.clone(),
            descriptor.pre_hooks(),
            descriptor.post_hooks(),
        );

        let sidecar = self.sidecar.clone().or_else(|| {
            self.config.sidecar_port.map(|port| {
                Arc::new(DaprHttpClient::new(SIDECAR_HOST, port)) as Arc<dyn SidecarClient>
            })
        });
        if let Some(sidecar) = &sidecar {
            if descriptor.needs_sidecar() {
                sidecar.wait_for_sidecar(self.config.sidecar_timeout).await?;
            }
        }

        let port = descriptor.port()?;
        let mut builder = RuntimeContext::builder(descriptor).gateway(gateway).pipeline(pipeline);
        if let Some(sidecar) = sidecar {
            builder = builder.sidecar(sidecar);
        }
        let runtime = Arc::new(builder.build());

        let http = if triggers.has_http() {
            let mut targets = targets.iter();
            let (name, function) = targets
                .next()
                .ok_or(RuntimeError::Registry(RegistryError::EmptyTarget))?;
            if targets.next().is_some() {
                warn!("HTTP trigger serves only '{}', ignoring the other targets", name);
            }
            let adapter = HttpAdapter::new(runtime.clone(), name.clone(), function.clone());
            debug!("HTTP trigger serving '{}' under {}", name, adapter.path());
            Some(self.bind(port, Arc::new(adapter), "HTTP trigger").await?)
        } else {
            None
        };

        let callback = if triggers.has_events() {
            let callback_port = match (self.config.callback_port, http.is_some()) {
                (Some(port), _) => port,
                (None, true) => port
                    .checked_add(1)
                    .ok_or_else(|| ConfigError::InvalidPort(port.to_string()))?,
                (None, false) => port,
            };
            let adapter = Arc::new(EventAdapter::new(runtime.clone(), targets)?);
            let server = CallbackServer::new(adapter);
            Some(self.bind(callback_port, Arc::new(server), "Event callback").await?)
        } else {
            None
        };

        Ok(StartedRuntime {
            runtime,
            http,
            callback,
        })
    }

    fn gateway(&self, descriptor: &FunctionDescriptor) -> Result<TracingGateway, RuntimeError> {
        let settings = descriptor.tracing_settings();
        let mut gateway = TracingGateway::from_settings(descriptor.name.clone(), settings)?;

        if let (Some(provider), Some(settings)) = (&self.tracing_provider, settings) {
            if gateway.is_enabled() {
                gateway = TracingGateway::new(descriptor.name.clone(), provider.clone());
                for (key, value) in &settings.tags {
                    gateway = gateway.with_tag(key.clone(), value.clone());
                }
                for (key, value) in &settings.baggage {
                    gateway = gateway.with_baggage(key.clone(), value.clone());
                }
            }
        }

        if let Some(pod_name) = &self.config.pod_name {
            gateway = gateway.with_tag(TAG_INSTANCE, pod_name.clone());
        }
        if let Some(namespace) = &self.config.pod_namespace {
            gateway = gateway.with_tag(TAG_NAMESPACE, namespace.clone());
        }
        Ok(gateway)
    }

    async fn bind(
        &self,
        port: u16,
        handler: Arc<dyn Handler>,
        name: &'static str,
    ) -> Result<Listener, RuntimeError> {
        let addr = self.config.bind_addr(port);
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| RuntimeError::InvalidAddress(addr.clone()))?;
        Ok(Listener::bind(addr, handler, self.config.max_body_size, name).await?)
    }
}

/// A runtime whose listeners are bound but not yet accepting.
pub struct StartedRuntime {
    runtime: Arc<RuntimeContext>,
    http: Option<Listener>,
    callback: Option<Listener>,
}

impl StartedRuntime {
    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.runtime
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn callback_addr(&self) -> Option<SocketAddr> {
        self.callback.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Accept on every bound listener until one of them fails.
    pub async fn serve(self) -> Result<(), RuntimeError> {
        let StartedRuntime { http, callback, .. } = self;
        let http = async move {
            match http {
                Some(listener) => listener.run().await,
                None => Ok::<(), io::Error>(()),
            }
        };
        let callback = async move {
            match callback {
                Some(listener) => listener.run().await,
                None => Ok::<(), io::Error>(()),
            }
        };

        tokio::try_join!(http, callback)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::log::LogProvider;

    fn config(descriptor: &str) -> RuntimeConfig {
        RuntimeConfig::new("f", descriptor).host("127.0.0.1")
    }

    #[test]
    fn test_gateway_tags_from_pod() {
        let descriptor = FunctionDescriptor::from_json(
            r#"{"name": "f", "triggers": {"http": {"port": 0}},
                "tracing": {"enabled": true, "provider": {"name": "log"}, "tags": {"team": "a"}}}"#,
        )
        .unwrap();
        let runtime = Runtime::new(config("").pod("f-1", "prod"));
        let gateway = runtime.gateway(&descriptor).unwrap();

        assert_eq!(gateway.provider_name(), Some("log"));
        assert_eq!(gateway.tags().get("instance").map(String::as_str), Some("f-1"));
        assert_eq!(gateway.tags().get("namespace").map(String::as_str), Some("prod"));
        assert_eq!(gateway.tags().get("team").map(String::as_str), Some("a"));
    }

    #[test]
    fn test_host_provider_only_when_enabled() {
        let disabled = FunctionDescriptor::from_json(r#"{"name": "f", "triggers": {"http": {}}}"#).unwrap();
        let runtime = Runtime::new(config("")).tracing_provider(Arc::new(LogProvider::new()));
        assert!(!runtime.gateway(&disabled).unwrap().is_enabled());

        let enabled = FunctionDescriptor::from_json(
            r#"{"name": "f", "triggers": {"http": {}}, "tracing": {"enabled": true}}"#,
        )
        .unwrap();
        assert_eq!(runtime.gateway(&enabled).unwrap().provider_name(), Some("log"));
    }

    #[tokio::test]
    async fn test_start_fails_on_bad_provider() {
        let runtime = Runtime::new(config(
            r#"{"name": "f", "triggers": {"http": {"port": 0}},
                "tracing": {"enabled": true, "provider": {"name": "zipkin"}}}"#,
        ));
        let err = runtime.start().await.err().unwrap();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::UnsupportedTracingProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_start_fails_on_unknown_target() {
        let runtime = Runtime::new(config(r#"{"name": "f", "triggers": {"http": {"port": 0}}}"#));
        let err = runtime.start().await.err().unwrap();
        assert!(matches!(err, RuntimeError::Registry(RegistryError::NotFound(_))));
    }
}
