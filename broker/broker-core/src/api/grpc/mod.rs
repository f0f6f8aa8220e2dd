//! `tonic` implementation of the `RegistrationBroker` service.

pub mod convert;
pub mod server;

pub use server::BrokerGrpcService;
