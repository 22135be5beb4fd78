//! driftsync library
//!
//! Timestamp-driven directory synchronization: a reconciliation protocol
//! over a line-delimited JSON channel, a lock-guarded file store, and the
//! client/server connection machinery around them.

pub mod channel;
pub mod cli;
pub mod client;
pub mod logger;
pub mod protocol;
pub mod reconcile;
pub mod server;
pub mod store;
pub mod tracker;
