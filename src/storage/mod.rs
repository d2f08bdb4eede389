//! Storage abstraction: the contract, its opendal-backed adapters, and the
//! virtual directory helpers built on top of it.

pub mod backends;
pub mod config;
pub mod contract;
pub mod directory;
pub mod error;
pub mod factory;
pub mod provider;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DEFAULT_BUCKET, StorageConfig};
pub use contract::{BackendKind, ByteStream, ObjectStorage};
pub use directory::DirectoryListing;
pub use error::{StorageError, StorageResult};
pub use factory::StorageFactory;
