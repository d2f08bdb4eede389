pub mod archive;
pub mod storage_service;

pub use storage_service::{PrefixDeletion, StorageService};
