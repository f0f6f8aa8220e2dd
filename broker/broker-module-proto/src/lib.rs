//! Generated gRPC transport types for the module registration callback
//! surface that every platform module implements.

#![forbid(unsafe_code)]

pub mod v1 {
    tonic::include_proto!("module.v1");
}

pub use v1::module_registration_client::ModuleRegistrationClient;
pub use v1::module_registration_server::{ModuleRegistration, ModuleRegistrationServer};
pub use v1::{GetServiceRegistrationRequest, ServiceRegistrationMetadata};
