//! Payment provider implementations
//!
//! Concrete implementations of the PaymentAdapter trait for different providers.

mod common;

pub mod airtel_money;
pub mod fedapay;
pub mod paystack;
pub mod semoa;

pub use airtel_money::AirtelMoneyAdapter;
pub use fedapay::FedapayAdapter;
pub use paystack::PaystackAdapter;
pub use semoa::SemoaAdapter;
