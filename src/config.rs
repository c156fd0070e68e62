//! Client configuration
//!
//! The schema consumed by [`PaymentSwitch`](crate::payments::client::PaymentSwitch)
//! plus loaders for files, environment variables and in-memory values.
//! Provider-level invariants (default provider, at least one provider) are
//! enforced by the switch, not here.

use crate::error::{PaymentError, PaymentResult};
use crate::payments::types::{Currency, Metadata, Provider};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Prefix for environment-variable configuration, e.g.
/// `PAYSWITCH__PROVIDERS__PAYSTACK__API_KEY`.
pub const ENV_PREFIX: &str = "PAYSWITCH";
const ENV_SEPARATOR: &str = "__";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
    Development,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    #[serde(alias = "critical")]
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include the event target (module path) in each line
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: LogLevel::Info,
            format: LogFormat::Plain,
            with_target: true,
        }
    }
}

/// Per-provider settings
///
/// Provider-specific fields travel in `extra`; each adapter documents the
/// keys it reads and rejects missing required ones at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// Overrides the adapter's sandbox/production URL
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub return_url: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub extra: Metadata,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ProviderConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: None,
            token: None,
            base_url: None,
            callback_url: None,
            return_url: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            environment: Environment::Sandbox,
            extra: Metadata::new(),
        }
    }

    pub fn with_extra<K: Into<String>, V: Into<serde_json::Value>>(mut self, key: K, value: V) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_callback_url<S: Into<String>>(mut self, callback_url: S) -> Self {
        self.callback_url = Some(callback_url.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// String value of an `extra` key; numbers and booleans are stringified,
    /// empty strings count as absent.
    pub fn extra_str(&self, key: &str) -> Option<String> {
        match self.extra.get(key)? {
            serde_json::Value::String(s) if s.trim().is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Picks the explicit `base_url` or the URL matching `environment`.
    pub fn resolve_base_url(&self, sandbox_url: &str, production_url: &str) -> String {
        let url = match &self.base_url {
            Some(url) if !url.trim().is_empty() => url.as_str(),
            _ if self.environment.is_production() => production_url,
            _ => sandbox_url,
        };
        url.trim_end_matches('/').to_string()
    }
}

/// Provider configs in configuration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderMap(Vec<(Provider, ProviderConfig)>);

impl ProviderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces an existing entry in place, otherwise appends.
    pub fn insert(&mut self, provider: Provider, config: ProviderConfig) {
        match self.0.iter_mut().find(|(existing, _)| *existing == provider) {
            Some(entry) => entry.1 = config,
            None => self.0.push((provider, config)),
        }
    }

    pub fn get(&self, provider: Provider) -> Option<&ProviderConfig> {
        self.0
            .iter()
            .find(|(existing, _)| *existing == provider)
            .map(|(_, config)| config)
    }

    pub fn contains(&self, provider: Provider) -> bool {
        self.get(provider).is_some()
    }

    pub fn providers(&self) -> impl Iterator<Item = Provider> + '_ {
        self.0.iter().map(|(provider, _)| *provider)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Provider, &ProviderConfig)> {
        self.0.iter().map(|(provider, config)| (*provider, config))
    }

    pub fn first(&self) -> Option<Provider> {
        self.0.first().map(|(provider, _)| *provider)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Provider, ProviderConfig)> for ProviderMap {
    fn from_iter<I: IntoIterator<Item = (Provider, ProviderConfig)>>(iter: I) -> Self {
        let mut map = ProviderMap::new();
        for (provider, config) in iter {
            map.insert(provider, config);
        }
        map
    }
}

impl Serialize for ProviderMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (provider, config) in &self.0 {
            map.serialize_entry(provider.as_str(), config)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ProviderMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ProviderMapVisitor;

        impl<'de> Visitor<'de> for ProviderMapVisitor {
            type Value = ProviderMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of provider tags to provider configs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut providers = ProviderMap::new();
                while let Some((provider, config)) =
                    access.next_entry::<Provider, ProviderConfig>()?
                {
                    if providers.contains(provider) {
                        return Err(serde::de::Error::custom(format!(
                            "provider {} configured twice",
                            provider
                        )));
                    }
                    providers.0.push((provider, config));
                }
                Ok(providers)
            }
        }

        deserializer.deserialize_map(ProviderMapVisitor)
    }
}

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_currency")]
    pub default_currency: Currency,
    #[serde(default)]
    pub default_provider: Option<Provider>,
    #[serde(default)]
    pub providers: ProviderMap,
}

fn default_currency() -> Currency {
    Currency::Xof
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Sandbox,
            debug: false,
            logging: LoggingConfig::default(),
            default_currency: default_currency(),
            default_provider: None,
            providers: ProviderMap::new(),
        }
    }
}

impl RootConfig {
    pub fn with_provider(mut self, provider: Provider, config: ProviderConfig) -> Self {
        self.providers.insert(provider, config);
        self
    }

    pub fn with_default_provider(mut self, provider: Provider) -> Self {
        self.default_provider = Some(provider);
        self
    }

    /// Load from `PAYSWITCH__*` environment variables.
    ///
    /// Environment variables carry no ordering, so set
    /// `PAYSWITCH__DEFAULT_PROVIDER` when more than one provider is enabled.
    pub fn from_env() -> PaymentResult<Self> {
        Self::load(None)
    }

    /// Load from a JSON, YAML or TOML file (format picked by extension).
    pub fn from_file<P: AsRef<Path>>(path: P) -> PaymentResult<Self> {
        let source = config::File::from(path.as_ref()).required(true);
        let settings = config::Config::builder()
            .add_source(source)
            .build()
            .map_err(config_error)?;
        settings.try_deserialize().map_err(config_error)
    }

    /// Layered load: the optional file first, then environment overrides.
    pub fn load(path: Option<&Path>) -> PaymentResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR))
            .build()
            .map_err(config_error)?;
        settings.try_deserialize().map_err(config_error)
    }

    /// Parse from an in-memory string in the given format.
    pub fn from_str_with_format(content: &str, format: config::FileFormat) -> PaymentResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(content, format))
            .build()
            .map_err(config_error)?;
        settings.try_deserialize().map_err(config_error)
    }

    /// Build from an in-memory JSON value (a "dictionary" source).
    pub fn from_value(value: serde_json::Value) -> PaymentResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| PaymentError::configuration(format!("Invalid configuration: {}", e)))
    }
}

fn config_error(error: config::ConfigError) -> PaymentError {
    PaymentError::configuration(format!("Failed to load configuration: {}", error))
}
