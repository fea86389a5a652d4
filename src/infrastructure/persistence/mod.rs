//! Persistence implementations

pub mod registry_store;
#[cfg(feature = "postgres")]
pub mod database;
#[cfg(feature = "postgres")]
pub mod cdr_repository;

#[cfg(feature = "postgres")]
pub use database::{create_pool, run_migrations, DatabaseConfig};
#[cfg(feature = "postgres")]
pub use cdr_repository::PgCdrRepository;
pub use registry_store::{InMemoryRegistryStore, RegistryStore, StoredBinding};
#[cfg(feature = "postgres")]
pub use registry_store::PgRegistryStore;
