//! Shared gRPC client transport configuration for outbound broker
//! connections (the module callback client, and any future internal
//! client).

pub mod client;

pub use client::{connect_with_retry, connect_with_stack, GrpcClientConfig, DEFAULT_FLOW_CONTROL_WINDOW};
