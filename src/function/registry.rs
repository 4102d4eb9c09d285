//! Startup-time registry mapping function identifiers to implementations.

use crate::function::handler::Function;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Lookup and registration failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("'{0}' is already registered")]
    Duplicate(String),

    #[error("'{0}' is not registered")]
    NotFound(String),

    #[error("no function target given")]
    EmptyTarget,

    #[error("function '{name}' ({variant}) cannot serve the {trigger} trigger")]
    UnsupportedVariant {
        name: String,
        variant: &'static str,
        trigger: &'static str,
    },
}

/// Registry of the functions a binary can run.
///
/// Functions are registered by identifier before the runtime starts;
/// `FUNCTION_TARGET` then selects among them. There is no runtime code
/// loading: whatever is not registered cannot be run.
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, Function>>,
}

impl FunctionRegistry {
    /// Create a new function registry.
    pub fn new() -> Self {
        Self {
            functions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a function under an identifier.
    pub async fn register(
        &self,
        name: impl Into<String>,
        function: Function,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let mut functions = self.functions.write().await;

        if functions.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        info!("Registered {} function: {}", function.variant(), name);
        functions.insert(name, function);
        Ok(())
    }

    /// Look up one function.
    pub async fn resolve(&self, name: &str) -> Result<Function, RegistryError> {
        let functions = self.functions.read().await;
        functions
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Resolve a comma-separated function target, keeping its order.
    pub async fn resolve_targets(
        &self,
        targets: &str,
    ) -> Result<Vec<(String, Function)>, RegistryError> {
        let mut resolved = Vec::new();
        for target in targets.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let function = self.resolve(target).await?;
            debug!("Resolved target '{}' to a {} function", target, function.variant());
            resolved.push((target.to_string(), function));
        }

        if resolved.is_empty() {
            return Err(RegistryError::EmptyTarget);
        }
        Ok(resolved)
    }

    /// List all registered functions with their variant.
    pub async fn list(&self) -> Vec<(String, &'static str)> {
        let functions = self.functions.read().await;
        let mut listed: Vec<_> = functions
            .iter()
            .map(|(name, function)| (name.clone(), function.variant()))
            .collect();
        listed.sort();
        listed
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
