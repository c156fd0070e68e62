//! Payment domain types and data structures
//!
//! Common types every provider adapter produces and consumes. Amounts are
//! always expressed in major units (e.g. naira, not kobo).

use crate::config::ProviderConfig;
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Open key/value bag passed through to or received from providers
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Supported payment providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provider {
    Paystack,
    Fedapay,
    AirtelMoney,
    Semoa,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Paystack,
        Provider::Fedapay,
        Provider::AirtelMoney,
        Provider::Semoa,
    ];

    /// Stable tag used in configuration and serialized records
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Paystack => "PAYSTACK",
            Provider::Fedapay => "FEDAPAY",
            Provider::AirtelMoney => "AIRTEL_MONEY",
            Provider::Semoa => "SEMOA",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = PaymentError;

    /// Case-insensitive; `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_uppercase().replace('-', "_");
        Provider::ALL
            .into_iter()
            .find(|provider| provider.as_str() == tag)
            .ok_or_else(|| PaymentError::InvalidProvider {
                provider: s.to_string(),
                available: Provider::ALL.to_vec(),
            })
    }
}

impl<'de> Deserialize<'de> for Provider {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Franc CFA (BCEAO)
    Xof,
    /// Franc CFA (BEAC)
    Xaf,
    Ngn,
    Ghs,
    Eur,
    Usd,
    Cdf,
    Gnf,
    Kmf,
    Ugx,
    Tzs,
    Kes,
    Rwf,
    Zmw,
    Mwk,
    Bif,
    Etb,
    Bwp,
    Zwl,
    Zar,
}

impl Currency {
    pub const ALL: [Currency; 20] = [
        Currency::Xof,
        Currency::Xaf,
        Currency::Ngn,
        Currency::Ghs,
        Currency::Eur,
        Currency::Usd,
        Currency::Cdf,
        Currency::Gnf,
        Currency::Kmf,
        Currency::Ugx,
        Currency::Tzs,
        Currency::Kes,
        Currency::Rwf,
        Currency::Zmw,
        Currency::Mwk,
        Currency::Bif,
        Currency::Etb,
        Currency::Bwp,
        Currency::Zwl,
        Currency::Zar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Xof => "XOF",
            Currency::Xaf => "XAF",
            Currency::Ngn => "NGN",
            Currency::Ghs => "GHS",
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Cdf => "CDF",
            Currency::Gnf => "GNF",
            Currency::Kmf => "KMF",
            Currency::Ugx => "UGX",
            Currency::Tzs => "TZS",
            Currency::Kes => "KES",
            Currency::Rwf => "RWF",
            Currency::Zmw => "ZMW",
            Currency::Mwk => "MWK",
            Currency::Bif => "BIF",
            Currency::Etb => "ETB",
            Currency::Bwp => "BWP",
            Currency::Zwl => "ZWL",
            Currency::Zar => "ZAR",
        }
    }

    /// Number of decimal places of the currency's minor unit
    pub fn minor_unit_exponent(&self) -> u32 {
        match self {
            Currency::Xof
            | Currency::Xaf
            | Currency::Gnf
            | Currency::Kmf
            | Currency::Ugx
            | Currency::Rwf
            | Currency::Bif => 0,
            _ => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Currency::ALL
            .into_iter()
            .find(|currency| currency.as_str() == code)
            .ok_or_else(|| {
                PaymentError::validation(Some("currency"), format!("Unknown currency '{}'", s))
            })
    }
}

/// Normalized transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Successful,
    Failed,
    Error,
    Cancelled,
    Refused,
    Declined,
    Expired,
    Refunded,
    Processing,
    Initiated,
    Unknown,
    Completed,
    Transferred,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 14] = [
        TransactionStatus::Pending,
        TransactionStatus::Successful,
        TransactionStatus::Failed,
        TransactionStatus::Error,
        TransactionStatus::Cancelled,
        TransactionStatus::Refused,
        TransactionStatus::Declined,
        TransactionStatus::Expired,
        TransactionStatus::Refunded,
        TransactionStatus::Processing,
        TransactionStatus::Initiated,
        TransactionStatus::Unknown,
        TransactionStatus::Completed,
        TransactionStatus::Transferred,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Successful => "successful",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Error => "error",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Refused => "refused",
            TransactionStatus::Declined => "declined",
            TransactionStatus::Expired => "expired",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Initiated => "initiated",
            TransactionStatus::Unknown => "unknown",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Transferred => "transferred",
        }
    }

    /// Looks up a canonical status name; anything else is `Unknown`.
    pub fn from_canonical(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        TransactionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == name)
            .unwrap_or(TransactionStatus::Unknown)
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Pending | TransactionStatus::Processing | TransactionStatus::Initiated
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Failed | TransactionStatus::Cancelled | TransactionStatus::Expired
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of money movement a transaction represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    #[default]
    Payment,
    Deposit,
    Withdrawal,
    Refund,
    Transfer,
}

/// Customer contact and identity details
///
/// No field is globally required; each adapter enforces its own subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub phone_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    /// ISO 3166 alpha-2 country code
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    /// Provider-side customer id
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl CustomerInfo {
    pub fn with_phone<S: Into<String>>(phone_number: S) -> Self {
        Self {
            phone_number: Some(phone_number.into()),
            ..Default::default()
        }
    }
}

/// Canonical transaction record
///
/// Input to `send_payment` and the shape returned by `get_transaction_detail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetail {
    pub transaction_id: String,
    pub provider: Provider,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub transaction_type: TransactionType,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub customer: CustomerInfo,
    pub reference: Option<String>,
    pub reason: Option<String>,
    pub callback_url: Option<String>,
    pub return_url: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub raw_data: serde_json::Value,
}

impl TransactionDetail {
    /// New pending payment with every optional field empty
    pub fn new<S: Into<String>>(
        transaction_id: S,
        provider: Provider,
        amount: Decimal,
        currency: Currency,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            provider,
            amount,
            currency,
            status: TransactionStatus::Pending,
            transaction_type: TransactionType::Payment,
            created_at: None,
            updated_at: None,
            completed_at: None,
            customer: CustomerInfo::default(),
            reference: None,
            reason: None,
            callback_url: None,
            return_url: None,
            metadata: Metadata::new(),
            raw_data: serde_json::Value::Null,
        }
    }
}

/// Result of a send or refund call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub transaction_id: String,
    pub provider: Provider,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: Currency,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reference: Option<String>,
    /// Redirect URL for hosted checkout flows
    pub payment_link: Option<String>,
    pub transaction_token: Option<String>,
    pub customer: Option<CustomerInfo>,
    #[serde(default)]
    pub raw_response: serde_json::Value,
    #[serde(default)]
    pub metadata: Metadata,
}

impl PaymentResponse {
    pub fn is_successful(&self) -> bool {
        self.status == TransactionStatus::Successful
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    pub fn is_failed(&self) -> bool {
        self.status.is_failed()
    }
}

/// Result of a status check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStatusResponse {
    pub transaction_id: String,
    pub provider: Provider,
    pub status: TransactionStatus,
    pub amount: Decimal,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Normalized inbound provider notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_type: String,
    pub provider: Provider,
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub raw_data: serde_json::Value,
    #[serde(default)]
    pub metadata: Metadata,
    /// Provider-specific auxiliary fields (msisdn, customer email, ...)
    #[serde(default)]
    pub context: Metadata,
}

/// Authentication material for a provider
///
/// Superset of every field any adapter reads. Adapters validate the subset
/// they need when they are constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub merchant_id: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub app_id: Option<String>,
    pub webhook_secret: Option<String>,
    pub callback_url: Option<String>,
    pub return_url: Option<String>,
}

impl ApiCredentials {
    /// Collects credentials from the typed config fields, then the `extra` map.
    ///
    /// Extra keys read: `api_secret`, `client_id`, `client_secret`,
    /// `merchant_id`, `token`, `username`, `password`, `app_id`,
    /// `webhook_secret`, `return_url`.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            api_secret: config
                .api_secret
                .clone()
                .or_else(|| config.extra_str("api_secret")),
            client_id: config.extra_str("client_id"),
            client_secret: config.extra_str("client_secret"),
            merchant_id: config.extra_str("merchant_id"),
            token: config.token.clone().or_else(|| config.extra_str("token")),
            username: config.extra_str("username"),
            password: config.extra_str("password"),
            app_id: config.extra_str("app_id"),
            webhook_secret: config.extra_str("webhook_secret"),
            callback_url: config.callback_url.clone(),
            return_url: config
                .return_url
                .clone()
                .or_else(|| config.extra_str("return_url")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn response_with(status: TransactionStatus) -> PaymentResponse {
        PaymentResponse {
            transaction_id: "tx_1".to_string(),
            provider: Provider::Paystack,
            status,
            amount: dec!(500),
            currency: Currency::Ngn,
            created_at: None,
            expires_at: None,
            reference: None,
            payment_link: None,
            transaction_token: None,
            customer: None,
            raw_response: serde_json::Value::Null,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_payment_response_predicates() {
        for status in TransactionStatus::ALL {
            let response = response_with(status);
            assert_eq!(response.is_successful(), status == TransactionStatus::Successful);
            assert_eq!(
                response.is_pending(),
                matches!(
                    status,
                    TransactionStatus::Pending
                        | TransactionStatus::Processing
                        | TransactionStatus::Initiated
                )
            );
            assert_eq!(
                response.is_failed(),
                matches!(
                    status,
                    TransactionStatus::Failed
                        | TransactionStatus::Cancelled
                        | TransactionStatus::Expired
                )
            );
        }
    }

    #[test]
    fn test_provider_parsing_is_case_insensitive() {
        assert_eq!("paystack".parse::<Provider>().unwrap(), Provider::Paystack);
        assert_eq!("airtel-money".parse::<Provider>().unwrap(), Provider::AirtelMoney);
        assert_eq!("AIRTEL_MONEY".parse::<Provider>().unwrap(), Provider::AirtelMoney);

        let err = "mpesa".parse::<Provider>().unwrap_err();
        assert_eq!(err.code(), "invalid_provider");
    }

    #[test]
    fn test_provider_serde_tag() {
        let json = serde_json::to_string(&Provider::AirtelMoney).unwrap();
        assert_eq!(json, "\"AIRTEL_MONEY\"");
        let parsed: Provider = serde_json::from_str("\"semoa\"").unwrap();
        assert_eq!(parsed, Provider::Semoa);
    }

    #[test]
    fn test_status_from_canonical() {
        assert_eq!(TransactionStatus::from_canonical("Successful"), TransactionStatus::Successful);
        assert_eq!(TransactionStatus::from_canonical("whatever"), TransactionStatus::Unknown);
        for status in TransactionStatus::ALL {
            assert_eq!(TransactionStatus::from_canonical(status.as_str()), status);
        }
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!("xof".parse::<Currency>().unwrap(), Currency::Xof);
        assert_eq!(Currency::Ngn.minor_unit_exponent(), 2);
        assert_eq!(Currency::Xof.minor_unit_exponent(), 0);
        assert!("BTC".parse::<Currency>().is_err());
    }
}
