//! Inbound transport adapters. Currently a single gRPC front door; any future
//! transport (e.g. a REST gateway) would land as a sibling module here.

pub mod grpc;
