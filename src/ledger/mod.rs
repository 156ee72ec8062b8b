//! The message ledger: durable record of outbound/inbound messages and delivery status.

pub mod message;
pub mod service;
pub mod store;
