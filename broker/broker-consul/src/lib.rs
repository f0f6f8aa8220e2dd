//! Discovery-store adapter (C2): registers and deregisters instances with
//! the discovery store, and reconstructs catalog entries from its flat
//! string-map metadata encoding on read-back.

pub mod adapter;
pub mod config;
pub mod encoding;

pub use adapter::ConsulDiscoveryStore;
pub use config::ConsulConfig;
