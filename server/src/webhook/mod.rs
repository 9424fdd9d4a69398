//! Webhook subscriptions and the delivery pipeline.

pub mod client;
pub mod handler;
pub mod sign;
pub mod url_guard;
pub mod worker;

// vim: ts=4
