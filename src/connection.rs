//! Connections: engine handle ownership, per-connection registries and thread affinity.

pub mod config;
mod core;
mod tx;

pub use config::{ConnectOptions, ConnectOptionsBuilder};
pub use core::Connection;
pub(crate) use core::ConnectionState;
