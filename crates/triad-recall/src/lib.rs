//! Recall store — the memory engine of the Triad coordination core.
//!
//! Keyed durable storage of [`MemoryEntity`] records with similarity/keyword
//! search under a fixed latency budget. Writes affecting durability are
//! synchronous; index maintenance may run asynchronously, during which
//! `search` degrades gracefully (partial results, flagged) while `get`
//! remains strongly consistent with the last successful `put`.
//!
//! # Main types
//!
//! - [`RecallStore`] — async storage/search trait.
//! - [`InMemoryRecallStore`] — brute-force scored scan, budget-bounded.
//! - [`FileRecallStore`] — JSONL-backed store; the in-memory index is fully
//!   reconstructed from the durable log on restart.

/// Similarity key derivation and score fusion.
pub mod index;
/// Entity model and store implementations.
pub mod store;

pub use store::{
    FileRecallStore, InMemoryRecallStore, MemoryEntity, RecallHit, RecallResponse, RecallStore,
    SearchQuery,
};
