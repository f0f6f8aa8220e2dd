//! Module callback client (C4): after a module passes its health check,
//! fetches its self-declared registration metadata over a cached gRPC
//! channel pool keyed by logical service name.

pub mod cache;
pub mod client;

pub use cache::{ChannelCache, ChannelCacheError};
pub use client::ModuleCallbackClient;
