//! Payment provider integration module
//!
//! This module provides a unified interface for mobile-money and card payment
//! providers (Paystack, FedaPay, Airtel Money, Semoa) in African markets.

pub mod auth;
pub mod client;
pub mod money;
pub mod providers;
pub mod registry;
pub mod traits;
pub mod transport;
pub mod types;
pub mod webhook;

pub use client::{PaymentRequest, PaymentSwitch, PaymentSwitchBuilder};
pub use registry::{AdapterRegistry, RegistryBuilder};
pub use traits::{PaymentAdapter, ProviderAdapter};
pub use types::{
    Currency, CustomerInfo, PaymentResponse, Provider, TransactionDetail, TransactionStatus,
    TransactionStatusResponse, WebhookEvent,
};
