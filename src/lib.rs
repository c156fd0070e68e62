//! Unified client for African mobile-money and card payment providers.
//!
//! Configure one or more providers in a [`RootConfig`], build a
//! [`PaymentSwitch`] and call it with or without an explicit [`Provider`].

pub mod config;
pub mod error;
pub mod logging;
pub mod payments;

pub use config::{Environment, ProviderConfig, RootConfig};
pub use error::{PaymentError, PaymentResult};
pub use payments::{
    Currency, CustomerInfo, PaymentRequest, PaymentResponse, PaymentSwitch, Provider,
    TransactionStatus, WebhookEvent,
};
