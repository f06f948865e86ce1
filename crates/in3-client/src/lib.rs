//! The `Client` bringing the node registry, picker, and request-execution
//! engine together (§2), client-wide config, the configurator (§4.8), and
//! the well-known-chain bootstrap of §6.

pub mod bootstrap;
pub mod client;
pub mod config;

pub use client::Client;
pub use config::apply as configure;
