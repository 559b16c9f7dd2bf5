//! rstest fixtures for integration tests

pub mod testcontainers;

pub use self::testcontainers::{ContainerAsync, GenericImage, redis_container};
