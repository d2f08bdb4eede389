use opendal::Operator;
use opendal::services::Memory;

use crate::storage::contract::BackendKind;
use crate::storage::directory::DirectoryListing;
use crate::storage::provider::Provider;

/// Process-local storage; each bucket is its own empty map on first use.
pub struct MemoryProvider;

impl Provider for MemoryProvider {
    const KIND: BackendKind = BackendKind::Memory;
    const DIRECTORY_LISTING: DirectoryListing = DirectoryListing::Synthesized;

    fn operator(&self, bucket: &str) -> opendal::Result<Operator> {
        let builder = Memory::default().root(&format!("/{bucket}"));
        Ok(Operator::new(builder)?.finish())
    }
}
