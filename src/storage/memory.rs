// src/storage/memory.rs

//! In-memory ledger. Nothing is persisted; intended for tests and dry runs.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Accession;
use crate::storage::Ledger;

#[derive(Debug, Default)]
pub struct MemoryLedger {
    seen: Mutex<HashSet<Accession>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Accession>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn contains(&self, accession: &Accession) -> Result<bool> {
        Ok(self.lock().contains(accession))
    }

    async fn commit(&self, accession: &Accession) -> Result<bool> {
        Ok(self.lock().insert(accession.clone()))
    }

    async fn count(&self) -> usize {
        self.lock().len()
    }
}
