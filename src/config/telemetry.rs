//! Tracing settings as declared in the function descriptor.

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Tracing section of the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TracingSettings {
    pub enabled: bool,
    pub provider: Option<ProviderSettings>,
    /// Static tags attached to every span.
    pub tags: BTreeMap<String, String>,
    /// Baggage stored in the trace context of every inbound span.
    pub baggage: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    pub name: String,
    pub oap_server: Option<String>,
    pub exporter: Option<ExporterSettings>,
}

/// Exporter settings, handed untouched to whoever builds the exporter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExporterSettings {
    pub name: String,
    pub endpoint: Option<String>,
    pub protocol: Option<String>,
    pub compression: Option<String>,
    pub timeout: Option<String>,
    pub headers: BTreeMap<String, String>,
}

/// Names of providers that exist elsewhere but have no driver here.
const KNOWN_UNAVAILABLE: &[&str] = &["skywalking"];

/// Tracing backends this runtime knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenTelemetry,
    Log,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "opentelemetry" => Ok(ProviderKind::OpenTelemetry),
            "log" => Ok(ProviderKind::Log),
            other if KNOWN_UNAVAILABLE.contains(&other) => {
                Err(ConfigError::TracingProviderUnavailable(other.to_string()))
            }
            other => Err(ConfigError::UnsupportedTracingProvider(other.to_string())),
        }
    }
}

impl TracingSettings {
    /// The provider to run with, `None` when tracing is off.
    ///
    /// Enabled tracing with an unknown provider is an error. Enabled
    /// tracing without a provider section uses OpenTelemetry.
    pub fn provider_kind(&self) -> Result<Option<ProviderKind>, ConfigError> {
        if !self.enabled {
            return Ok(None);
        }
        match &self.provider {
            Some(provider) => provider.name.parse().map(Some),
            None => Ok(Some(ProviderKind::OpenTelemetry)),
        }
    }

    pub fn exporter(&self) -> Option<&ExporterSettings> {
        self.provider.as_ref().and_then(|p| p.exporter.as_ref())
    }
}
