//! Process-wide state shared by every invocation.

use crate::config::{ComponentRegistry, FunctionDescriptor};
use crate::interceptor::Pipeline;
use crate::sidecar::SidecarClient;
use crate::telemetry::TracingGateway;
use std::fmt;
use std::sync::Arc;

/// Read-only state built once at startup and handed to each invocation.
#[derive(Clone)]
pub struct RuntimeContext {
    descriptor: Arc<FunctionDescriptor>,
    components: ComponentRegistry,
    gateway: TracingGateway,
    pipeline: Pipeline,
    sidecar: Option<Arc<dyn SidecarClient>>,
}

impl RuntimeContext {
    pub fn builder(descriptor: FunctionDescriptor) -> RuntimeContextBuilder {
        RuntimeContextBuilder::new(descriptor)
    }

    pub fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    pub fn function_name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn gateway(&self) -> &TracingGateway {
        &self.gateway
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn sidecar(&self) -> Option<&Arc<dyn SidecarClient>> {
        self.sidecar.as_ref()
    }

    /// Whether event invocations consume declared inputs.
    pub fn has_inputs(&self) -> bool {
        !self.components.inputs().is_empty() || !self.components.event_triggers().is_empty()
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("function", &self.descriptor.name)
            .field("gateway", &self.gateway)
            .field("sidecar", &self.sidecar.is_some())
            .finish()
    }
}

/// Builder for [`RuntimeContext`].
pub struct RuntimeContextBuilder {
    descriptor: FunctionDescriptor,
    gateway: Option<TracingGateway>,
    pipeline: Pipeline,
    sidecar: Option<Arc<dyn SidecarClient>>,
}

impl RuntimeContextBuilder {
    fn new(descriptor: FunctionDescriptor) -> Self {
        Self {
            descriptor,
            gateway: None,
            pipeline: Pipeline::empty(),
            sidecar: None,
        }
    }

    pub fn gateway(mut self, gateway: TracingGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn sidecar(mut self, sidecar: Arc<dyn SidecarClient>) -> Self {
        self.sidecar = Some(sidecar);
        self
    }

    pub fn build(self) -> RuntimeContext {
        let gateway = self
            .gateway
            .unwrap_or_else(|| TracingGateway::disabled(self.descriptor.name.clone()));
        RuntimeContext {
            components: self.descriptor.component_registry(),
            descriptor: Arc::new(self.descriptor),
            gateway,
            pipeline: self.pipeline,
            sidecar: self.sidecar,
        }
    }
}
