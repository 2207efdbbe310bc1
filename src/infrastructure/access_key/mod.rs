//! Access key infrastructure: repositories, burst guard and service

mod burst_guard;
mod generator;
mod postgres;
mod repository;
mod service;

pub use burst_guard::{BurstGuard, BurstPolicy};
pub use generator::AccessKeyGenerator;
pub use postgres::{PostgresAccessKeyRepository, PostgresConfig};
pub use repository::InMemoryAccessKeyRepository;
pub use service::{AccessKeyService, CreateAccessKey, DeviceList};
