//! Subscribe gateway: long-lived duplex channels between external clients
//! and per-tenant stream consumers.

pub mod channel;
pub mod handler;

// vim: ts=4
