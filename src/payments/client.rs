//! Payment switch
//!
//! [`PaymentSwitch`] owns one adapter per configured provider and routes every
//! operation to the requested provider, or to the default one when the caller
//! does not name a provider.

use crate::config::RootConfig;
use crate::error::{PaymentError, PaymentResult};
use crate::payments::registry::AdapterRegistry;
use crate::payments::traits::PaymentAdapter;
use crate::payments::transport::{HttpTransport, ReqwestTransport};
use crate::payments::types::{
    Currency, CustomerInfo, Metadata, PaymentResponse, Provider, TransactionDetail,
    TransactionStatus, TransactionStatusResponse, WebhookEvent,
};
use chrono::Utc;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Caller input for [`PaymentSwitch::send_payment`]
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub phone_number: String,
    /// Caller-side correlation string, distinct from the transaction id
    pub reference: Option<String>,
    /// Falls back to the configured default currency
    pub currency: Option<Currency>,
    pub customer: Option<CustomerInfo>,
    pub metadata: Metadata,
    pub reason: Option<String>,
}

impl PaymentRequest {
    pub fn new<S: Into<String>>(amount: Decimal, phone_number: S) -> Self {
        Self {
            amount,
            phone_number: phone_number.into(),
            reference: None,
            currency: None,
            customer: None,
            metadata: Metadata::new(),
            reason: None,
        }
    }

    pub fn with_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }

    pub fn with_customer(mut self, customer: CustomerInfo) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn with_metadata<K: Into<String>, V: Into<serde_json::Value>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Builds a [`PaymentSwitch`] with an optional custom registry or transport
pub struct PaymentSwitchBuilder {
    config: RootConfig,
    registry: Option<AdapterRegistry>,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl PaymentSwitchBuilder {
    /// Defaults to [`AdapterRegistry::global`].
    pub fn registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Defaults to a [`ReqwestTransport`] shared by every adapter.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Instantiates every configured adapter. Fails as a whole if any one
    /// of them cannot be built.
    pub fn build(self) -> PaymentResult<PaymentSwitch> {
        let config = self.config;

        let default_provider = match (config.default_provider, config.providers.first()) {
            (_, None) => {
                return Err(PaymentError::configuration(
                    "At least one payment provider must be configured",
                ))
            }
            (Some(provider), Some(_)) if !config.providers.contains(provider) => {
                return Err(PaymentError::configuration(format!(
                    "Default provider {} is not configured. Configured providers: {:?}",
                    provider,
                    config.providers.providers().collect::<Vec<_>>()
                )))
            }
            (Some(provider), Some(_)) => provider,
            (None, Some(first)) => first,
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let registry = self.registry.as_ref().unwrap_or_else(|| AdapterRegistry::global());

        let mut adapters: Vec<(Provider, Arc<dyn PaymentAdapter>)> =
            Vec::with_capacity(config.providers.len());
        for (provider, provider_config) in config.providers.iter() {
            let adapter = registry
                .build(provider, provider_config.clone(), transport.clone())
                .map_err(|e| {
                    error!("Failed to initialize provider {}: {}", provider, e);
                    PaymentError::configuration(format!(
                        "Failed to initialize provider {}: {}",
                        provider, e
                    ))
                })?;
            adapters.push((provider, Arc::from(adapter)));
        }

        info!(
            "Payment switch ready: providers={:?}, default={}",
            adapters.iter().map(|(provider, _)| *provider).collect::<Vec<_>>(),
            default_provider
        );

        Ok(PaymentSwitch {
            adapters,
            default_provider,
            default_currency: config.default_currency,
        })
    }
}

/// Unified entry point over every configured provider
#[derive(Clone)]
pub struct PaymentSwitch {
    adapters: Vec<(Provider, Arc<dyn PaymentAdapter>)>,
    default_provider: Provider,
    default_currency: Currency,
}

impl std::fmt::Debug for PaymentSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentSwitch")
            .field("providers", &self.providers())
            .field("default_provider", &self.default_provider)
            .field("default_currency", &self.default_currency)
            .finish()
    }
}

impl PaymentSwitch {
    pub fn builder(config: RootConfig) -> PaymentSwitchBuilder {
        PaymentSwitchBuilder {
            config,
            registry: None,
            transport: None,
        }
    }

    pub fn new(config: RootConfig) -> PaymentResult<Self> {
        Self::builder(config).build()
    }

    /// Configuration from `PAYSWITCH__*` environment variables
    pub fn from_env() -> PaymentResult<Self> {
        Self::new(RootConfig::from_env()?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> PaymentResult<Self> {
        Self::new(RootConfig::from_file(path)?)
    }

    pub fn default_provider(&self) -> Provider {
        self.default_provider
    }

    pub fn default_currency(&self) -> Currency {
        self.default_currency
    }

    /// Configured providers in configuration order
    pub fn providers(&self) -> Vec<Provider> {
        self.adapters.iter().map(|(provider, _)| *provider).collect()
    }

    /// Adapter for `provider`, or for the default provider
    pub fn adapter(&self, provider: Option<Provider>) -> PaymentResult<&dyn PaymentAdapter> {
        let provider = provider.unwrap_or(self.default_provider);
        self.adapters
            .iter()
            .find(|(configured, _)| *configured == provider)
            .map(|(_, adapter)| adapter.as_ref())
            .ok_or_else(|| PaymentError::InvalidProvider {
                provider: provider.to_string(),
                available: self.providers(),
            })
    }

    /// Starts a payment.
    ///
    /// The transaction id is a fresh v4 UUID; callback and return URLs come
    /// from the provider's configuration.
    pub async fn send_payment(
        &self,
        provider: Option<Provider>,
        request: PaymentRequest,
    ) -> PaymentResult<PaymentResponse> {
        let adapter = self.adapter(provider)?;
        let transaction = self.transaction_for(adapter, request);

        debug!(
            "Dispatching payment {} to {}",
            transaction.transaction_id,
            adapter.provider()
        );
        adapter.send_payment(&transaction).await
    }

    fn transaction_for(&self, adapter: &dyn PaymentAdapter, request: PaymentRequest) -> TransactionDetail {
        let currency = request.currency.unwrap_or(self.default_currency);
        let mut transaction = TransactionDetail::new(
            Uuid::new_v4().to_string(),
            adapter.provider(),
            request.amount,
            currency,
        );

        let mut customer = request.customer.unwrap_or_default();
        if !request.phone_number.trim().is_empty() {
            customer.phone_number = Some(request.phone_number);
        }

        transaction.customer = customer;
        transaction.reference = request.reference;
        transaction.reason = request.reason;
        transaction.metadata = request.metadata;
        transaction.created_at = Some(Utc::now());
        transaction.callback_url = adapter.config().callback_url.clone();
        transaction.return_url = adapter
            .config()
            .return_url
            .clone()
            .or_else(|| adapter.config().extra_str("return_url"));
        transaction
    }

    pub async fn check_status(
        &self,
        provider: Option<Provider>,
        transaction_id: &str,
    ) -> PaymentResult<TransactionStatus> {
        Ok(self.check_status_detail(provider, transaction_id).await?.status)
    }

    pub async fn check_status_detail(
        &self,
        provider: Option<Provider>,
        transaction_id: &str,
    ) -> PaymentResult<TransactionStatusResponse> {
        self.adapter(provider)?.check_status(transaction_id).await
    }

    pub async fn cancel_transaction(
        &self,
        provider: Option<Provider>,
        transaction_id: &str,
    ) -> PaymentResult<bool> {
        self.adapter(provider)?.cancel_transaction(transaction_id).await
    }

    /// Full refund when `amount` is `None`.
    pub async fn refund(
        &self,
        provider: Option<Provider>,
        transaction_id: &str,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> PaymentResult<PaymentResponse> {
        self.adapter(provider)?
            .refund(transaction_id, amount, reason)
            .await
    }

    pub async fn get_transaction_detail(
        &self,
        provider: Option<Provider>,
        transaction_id: &str,
    ) -> PaymentResult<TransactionDetail> {
        self.adapter(provider)?
            .get_transaction_detail(transaction_id)
            .await
    }

    /// Checks the signature of a raw webhook body.
    pub fn validate_webhook(
        &self,
        provider: Provider,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> PaymentResult<bool> {
        Ok(self.adapter(Some(provider))?.validate_webhook(raw_body, headers))
    }

    pub fn parse_webhook(
        &self,
        provider: Provider,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> PaymentResult<WebhookEvent> {
        self.adapter(Some(provider))?.parse_webhook(raw_body, headers)
    }
}
