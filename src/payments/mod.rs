//! Payments: the gateway seam, the Stripe client behind it, and the
//! reconciliation engine driving checkout and confirmation.

pub mod engine;
mod gateway;
mod stripe;

pub use gateway::{Charge, CheckoutItem, CheckoutSession, PaymentGateway};
pub use stripe::StripeGateway;
