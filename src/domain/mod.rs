//! Domain layer - entities, value types and the traits infrastructure implements

pub mod access_key;
pub mod error;
pub mod notification;

pub use error::DomainError;
