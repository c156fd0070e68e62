//! Payment adapter trait definitions
//!
//! Defines the common interface that all payment providers must implement.
//! Pure translation (status mapping, payload formatting, webhook checks) is
//! synchronous; everything that touches the network is async.

use crate::config::ProviderConfig;
use crate::error::{PaymentError, PaymentResult};
use crate::payments::money::{check_amount, AmountLimits};
use crate::payments::transport::HttpTransport;
use crate::payments::types::{
    Currency, CustomerInfo, PaymentResponse, Provider, TransactionDetail, TransactionStatus,
    TransactionStatusResponse, WebhookEvent,
};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Free-form options for header construction (e.g. `country`, `currency`)
pub type HeaderOptions = HashMap<String, String>;

/// Customer fields an adapter may require before sending a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerField {
    PhoneNumber,
    Email,
    FirstName,
    LastName,
    Country,
}

impl CustomerField {
    pub fn name(&self) -> &'static str {
        match self {
            CustomerField::PhoneNumber => "phone_number",
            CustomerField::Email => "email",
            CustomerField::FirstName => "first_name",
            CustomerField::LastName => "last_name",
            CustomerField::Country => "country",
        }
    }

    pub fn is_present(&self, customer: &CustomerInfo) -> bool {
        let value = match self {
            CustomerField::PhoneNumber => &customer.phone_number,
            CustomerField::Email => &customer.email,
            CustomerField::FirstName => &customer.first_name,
            CustomerField::LastName => &customer.last_name,
            CustomerField::Country => &customer.country,
        };
        value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}

/// Trait for payment provider implementations
///
/// Every provider integration implements this trait so the switch can route
/// calls without knowing the provider's wire format.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    fn config(&self) -> &ProviderConfig;

    /// Supported currencies with their transactable range
    fn amount_limits(&self) -> &'static [AmountLimits];

    /// Customer fields that must be present on every outbound transaction
    fn required_customer_fields(&self) -> &'static [CustomerField] {
        &[]
    }

    fn supported_currencies(&self) -> Vec<Currency> {
        self.amount_limits().iter().map(|limit| limit.currency).collect()
    }

    /// Whether the configured credentials cover what this provider needs
    fn validate_credentials(&self) -> bool;

    /// Request headers, optionally carrying authorization.
    ///
    /// May fetch a token, hence async.
    async fn get_headers(
        &self,
        authorization: bool,
        options: &HeaderOptions,
    ) -> PaymentResult<HeaderMap>;

    /// Maps a provider status code onto [`TransactionStatus`].
    ///
    /// Total: unrecognized codes map to `Unknown`.
    fn normalize_status(&self, status: &str) -> TransactionStatus;

    /// Range, currency and required-field checks shared by every adapter
    fn validate_transaction(&self, transaction: &TransactionDetail) -> PaymentResult<()> {
        check_amount(
            self.provider(),
            self.amount_limits(),
            transaction.amount,
            transaction.currency,
        )?;

        for field in self.required_customer_fields() {
            if !field.is_present(&transaction.customer) {
                return Err(PaymentError::validation(
                    Some(field.name()),
                    format!("{} is required by {}", field.name(), self.provider()),
                ));
            }
        }
        Ok(())
    }

    /// Provider-specific request payload. Validates first.
    fn format_transaction(&self, transaction: &TransactionDetail) -> PaymentResult<serde_json::Value>;

    /// Checks the signature over the exact body bytes received. Never errors.
    fn validate_webhook(&self, raw_body: &[u8], headers: &HeaderMap) -> bool;

    /// Verifies, then decodes and normalizes an inbound notification.
    fn parse_webhook(&self, raw_body: &[u8], headers: &HeaderMap) -> PaymentResult<WebhookEvent>;

    async fn send_payment(&self, transaction: &TransactionDetail) -> PaymentResult<PaymentResponse>;

    async fn check_status(&self, transaction_id: &str) -> PaymentResult<TransactionStatusResponse>;

    /// `Ok(true)` when the provider accepted the cancellation. Providers
    /// without a cancel primitive return `UnsupportedOperation`.
    async fn cancel_transaction(&self, transaction_id: &str) -> PaymentResult<bool>;

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> PaymentResult<PaymentResponse>;

    async fn get_transaction_detail(&self, transaction_id: &str) -> PaymentResult<TransactionDetail>;
}

/// Construction hook used by the adapter registry
pub trait ProviderAdapter: PaymentAdapter + Sized + 'static {
    /// Tag the adapter registers under when none is given explicitly
    const PROVIDER: Provider;

    /// Builds the adapter, failing with a configuration error when a
    /// required credential or `extra` key is missing.
    fn from_config(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> PaymentResult<Self>;
}
