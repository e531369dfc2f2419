// Shared test helpers — not all items used by every test binary.
#![allow(unused)]

use contextd::branch::BranchManager;
use contextd::config::Config;
use contextd::dispatch::Dispatcher;
use contextd::storage::local::{LocalEmbeddingProvider, LocalVectorStore};
use std::sync::Arc;

/// Build a full in-process stack over the local (non-fake, non-test-only)
/// storage adapters, the same assembly `cli::serve` uses. Integration tests
/// live outside the crate so they can't reach the `#[cfg(test)]` fakes in
/// `storage::fakes` — `storage::local` is the one production-usable default.
pub async fn stack() -> (Dispatcher, BranchManager) {
    let config = Config::default();
    let store = Arc::new(LocalVectorStore::new());
    let embedder = Arc::new(LocalEmbeddingProvider);
    contextd::build_dispatcher(&config, store, embedder)
        .await
        .expect("wire dispatcher")
}
