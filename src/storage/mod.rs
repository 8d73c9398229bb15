// src/storage/mod.rs

//! Dedup ledger abstractions.
//!
//! The ledger is the persistent set of accessions already emitted. An
//! accession is committed only after its record was delivered, and a
//! committed accession is never removed.
//!
//! ## File Layout
//!
//! ```text
//! data/
//! └── ledger.log     # one accession per line, append-only
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Accession;

// Re-export for convenience
pub use local::FileLedger;
pub use memory::MemoryLedger;

/// Trait for dedup ledger backends.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Whether the accession was already emitted.
    async fn contains(&self, accession: &Accession) -> Result<bool>;

    /// Durably record an emitted accession.
    ///
    /// Returns `false` when it was already present. Committing twice is a no-op.
    async fn commit(&self, accession: &Accession) -> Result<bool>;

    /// Number of committed accessions.
    async fn count(&self) -> usize;
}
