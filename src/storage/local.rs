// src/storage/local.rs

//! Append-only ledger file.
//!
//! Each committed accession is appended as one line and synced to disk
//! before it becomes visible in memory. On open the log is replayed; a
//! torn final line is repaired, and invalid or duplicate lines trigger a
//! compaction that rewrites the file atomically (temp file, then rename).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::Accession;
use crate::storage::Ledger;

struct LedgerState {
    seen: HashSet<Accession>,
    file: File,
}

/// What replaying the log found.
#[derive(Debug, Default, PartialEq, Eq)]
struct Replay {
    entries: Vec<Accession>,
    invalid: usize,
    duplicates: usize,
    torn: bool,
}

fn replay(content: &str) -> Replay {
    let mut replay = Replay {
        torn: !content.is_empty() && !content.ends_with('\n'),
        ..Replay::default()
    };
    let mut seen = HashSet::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<Accession>() {
            Ok(accession) => {
                if seen.insert(accession.clone()) {
                    replay.entries.push(accession);
                } else {
                    replay.duplicates += 1;
                }
            }
            Err(_) => {
                replay.invalid += 1;
                log::warn!("Skipping invalid ledger line: {:?}", line);
            }
        }
    }
    replay
}

/// Ledger persisted as a newline-delimited accession log.
pub struct FileLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl FileLedger {
    /// Open (or create) the ledger at `path` and replay its contents.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let fail = |e: std::io::Error| AppError::ledger(path.display(), e);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(fail)?;
        }

        let content = match tokio::fs::read(&path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(fail(e)),
        };
        let replay = replay(&content);

        if replay.invalid > 0 || replay.duplicates > 0 {
            log::info!(
                "Compacting ledger {} ({} invalid, {} duplicate lines)",
                path.display(),
                replay.invalid,
                replay.duplicates
            );
            Self::rewrite(&path, &replay.entries).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(fail)?;

        if replay.torn && replay.invalid == 0 && replay.duplicates == 0 {
            file.write_all(b"\n").await.map_err(fail)?;
            file.sync_data().await.map_err(fail)?;
            log::info!("Repaired torn final line in {}", path.display());
        }

        log::info!(
            "Ledger {} holds {} accessions",
            path.display(),
            replay.entries.len()
        );
        Ok(Self {
            state: Mutex::new(LedgerState {
                seen: replay.entries.into_iter().collect(),
                file,
            }),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write entries atomically (write to temp, then rename).
    async fn rewrite(path: &Path, entries: &[Accession]) -> Result<()> {
        let fail = |e: std::io::Error| AppError::ledger(path.display(), e);
        let mut bytes = Vec::with_capacity(entries.len() * 21);
        for accession in entries {
            bytes.extend_from_slice(accession.as_str().as_bytes());
            bytes.push(b'\n');
        }

        let tmp = path.with_extension("tmp");
        let mut file = File::create(&tmp).await.map_err(fail)?;
        file.write_all(&bytes).await.map_err(fail)?;
        file.sync_all().await.map_err(fail)?;
        drop(file);

        tokio::fs::rename(&tmp, path).await.map_err(fail)?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for FileLedger {
    async fn contains(&self, accession: &Accession) -> Result<bool> {
        Ok(self.state.lock().await.seen.contains(accession))
    }

    async fn commit(&self, accession: &Accession) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.seen.contains(accession) {
            return Ok(false);
        }

        let fail = |e: std::io::Error| AppError::ledger(self.path.display(), e);
        let line = format!("{accession}\n");
        state.file.write_all(line.as_bytes()).await.map_err(fail)?;
        state.file.flush().await.map_err(fail)?;
        state.file.sync_data().await.map_err(fail)?;

        state.seen.insert(accession.clone());
        Ok(true)
    }

    async fn count(&self) -> usize {
        self.state.lock().await.seen.len()
    }
}
