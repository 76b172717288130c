//! Payment processor integration.

pub mod stripe;

pub use stripe::{sign_payload, verify_signature, CheckoutSession, RetrievedSession, StripeClient};
