use super::Interceptor;
use crate::function::RegistryError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

type Factory = Arc<dyn Fn() -> Arc<dyn Interceptor> + Send + Sync>;

/// How instances are handed to invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// One instance shared by all concurrent invocations.
    Shared,
    /// A fresh instance per invocation, for interceptors holding
    /// per-request state.
    PerInvocation,
}

#[derive(Clone)]
enum Entry {
    Shared(Arc<dyn Interceptor>),
    PerInvocation(Factory),
}

/// Identifier → interceptor lookup, filled before startup.
#[derive(Clone, Default)]
pub struct InterceptorRegistry {
    entries: HashMap<String, Entry>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stateless interceptor shared by every invocation.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        interceptor: impl Interceptor + 'static,
    ) -> Result<(), RegistryError> {
        self.insert(id.into(), Entry::Shared(Arc::new(interceptor)))
    }

    /// Register a factory called once per invocation.
    pub fn register_per_invocation<F, I>(
        &mut self,
        id: impl Into<String>,
        factory: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: Interceptor + 'static,
    {
        let factory: Factory = Arc::new(move || Arc::new(factory()) as Arc<dyn Interceptor>);
        self.insert(id.into(), Entry::PerInvocation(factory))
    }

    fn insert(&mut self, id: String, entry: Entry) -> Result<(), RegistryError> {
        if self.entries.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        info!("Registered interceptor: {}", id);
        self.entries.insert(id, entry);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn lifecycle(&self, id: &str) -> Option<Lifecycle> {
        self.entries.get(id).map(|entry| match entry {
            Entry::Shared(_) => Lifecycle::Shared,
            Entry::PerInvocation(_) => Lifecycle::PerInvocation,
        })
    }

    /// Instance to run for one invocation.
    pub fn init(&self, id: &str) -> Result<Arc<dyn Interceptor>, RegistryError> {
        match self.entries.get(id) {
            Some(Entry::Shared(interceptor)) => Ok(interceptor.clone()),
            Some(Entry::PerInvocation(factory)) => Ok(factory()),
            None => Err(RegistryError::NotFound(id.to_string())),
        }
    }
}
