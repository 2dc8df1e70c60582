//! Shared wire types and errors for `envelope-svc` and its clients.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
