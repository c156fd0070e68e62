//! Adapter registry
//!
//! Maps each [`Provider`] tag to the constructor of its adapter. A registry is
//! assembled with [`RegistryBuilder`] and frozen by [`RegistryBuilder::finalize`];
//! the resulting [`AdapterRegistry`] has no way to register further adapters.
//! [`AdapterRegistry::global`] holds every built-in adapter.

use crate::config::ProviderConfig;
use crate::error::{PaymentError, PaymentResult};
use crate::payments::providers::{AirtelMoneyAdapter, FedapayAdapter, PaystackAdapter, SemoaAdapter};
use crate::payments::traits::{PaymentAdapter, ProviderAdapter};
use crate::payments::transport::HttpTransport;
use crate::payments::types::Provider;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type Constructor =
    fn(ProviderConfig, Arc<dyn HttpTransport>) -> PaymentResult<Box<dyn PaymentAdapter>>;

fn construct<A: ProviderAdapter>(
    config: ProviderConfig,
    transport: Arc<dyn HttpTransport>,
) -> PaymentResult<Box<dyn PaymentAdapter>> {
    Ok(Box::new(A::from_config(config, transport)?))
}

/// Registered constructor for one provider tag
#[derive(Clone, Copy)]
pub struct AdapterFactory {
    type_id: TypeId,
    type_name: &'static str,
    constructor: Constructor,
}

impl AdapterFactory {
    fn of<A: ProviderAdapter>() -> Self {
        Self {
            type_id: TypeId::of::<A>(),
            type_name: std::any::type_name::<A>(),
            constructor: construct::<A>,
        }
    }

    /// Fully qualified name of the adapter type
    pub fn adapter_name(&self) -> &'static str {
        self.type_name
    }

    pub fn create(
        &self,
        config: ProviderConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> PaymentResult<Box<dyn PaymentAdapter>> {
        (self.constructor)(config, transport)
    }
}

impl fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterFactory")
            .field("adapter", &self.type_name)
            .finish()
    }
}

/// Collects registrations until [`finalize`](Self::finalize)
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    factories: BTreeMap<Provider, AdapterFactory>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `A` under `A::PROVIDER`.
    pub fn register<A: ProviderAdapter>(self) -> PaymentResult<Self> {
        self.register_as::<A>(A::PROVIDER)
    }

    /// Registers `A` under an explicit tag.
    ///
    /// Registering the same adapter again is a no-op. A different adapter
    /// for a tag that is already taken is a configuration error.
    pub fn register_as<A: ProviderAdapter>(mut self, provider: Provider) -> PaymentResult<Self> {
        let factory = AdapterFactory::of::<A>();

        if let Some(existing) = self.factories.get(&provider) {
            if existing.type_id == factory.type_id {
                return Ok(self);
            }
            return Err(PaymentError::configuration(format!(
                "Provider {} is already registered to {}, refusing {}",
                provider, existing.type_name, factory.type_name
            )));
        }

        debug!("Registered adapter {} for {}", factory.type_name, provider);
        self.factories.insert(provider, factory);
        Ok(self)
    }

    pub fn finalize(self) -> AdapterRegistry {
        AdapterRegistry {
            factories: self.factories,
        }
    }
}

static GLOBAL: Lazy<AdapterRegistry> = Lazy::new(|| {
    AdapterRegistry::builtin().expect("built-in adapters register under distinct tags")
});

/// Immutable provider → adapter mapping
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    factories: BTreeMap<Provider, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Process-wide registry with every built-in adapter, built on first use
    pub fn global() -> &'static AdapterRegistry {
        &GLOBAL
    }

    /// Every built-in adapter, registered the same way callers register theirs
    pub fn builtin() -> PaymentResult<Self> {
        Ok(RegistryBuilder::new()
            .register::<PaystackAdapter>()?
            .register::<FedapayAdapter>()?
            .register::<AirtelMoneyAdapter>()?
            .register::<SemoaAdapter>()?
            .finalize())
    }

    pub fn get(&self, provider: Provider) -> PaymentResult<&AdapterFactory> {
        self.factories
            .get(&provider)
            .ok_or_else(|| PaymentError::InvalidProvider {
                provider: provider.to_string(),
                available: self.providers(),
            })
    }

    pub fn contains(&self, provider: Provider) -> bool {
        self.factories.contains_key(&provider)
    }

    /// Registered tags in declaration order of [`Provider`]
    pub fn providers(&self) -> Vec<Provider> {
        self.factories.keys().copied().collect()
    }

    /// Looks up and constructs the adapter for `provider`.
    pub fn build(
        &self,
        provider: Provider,
        config: ProviderConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> PaymentResult<Box<dyn PaymentAdapter>> {
        self.get(provider)?.create(config, transport)
    }
}
