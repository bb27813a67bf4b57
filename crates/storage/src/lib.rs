//! The persistent key-value capability: an ordered byte-string store
//! keyed by the prefix spaces `process/<pid>`, `vote/<pid>/<voteID>`,
//! `pending/<pid>/<voteID>`, `census/<root>`, `worker/<addr>`.
//!
//! [`keys`] builds the prefixed key for each space; [`codec`] encodes and
//! decodes the records that live at them. [`Storage`] is the capability
//! trait every other crate depends on, never a concrete backend: the
//! in-memory map in [`memory`] is the default everywhere this workspace's
//! own tests run, and the `postgres` feature adds a durable `sqlx`-backed
//! implementation for production, a feature-gated backend choice kept out
//! of the default build so tests never need a live database.

pub mod codec;
pub mod keys;
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStorage;
pub use zkseq_types::StorageError;

use async_trait::async_trait;

/// An ordered key-value capability. Every other subsystem (process
/// directory, pending index, worker registry) is built on top of this
/// rather than depending on a concrete backend.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
    async fn delete(&self, key: &[u8]) -> Result<(), StorageError>;
    /// Every key with the given prefix, in key order — the primitive
    /// `scan_prefix` the process directory and pending index are built on.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;
}
