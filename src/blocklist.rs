//! File-backed IP blocklist.
//!
//! The backing file holds one address literal per line; blank lines and
//! lines whose first non-whitespace character is `#` are comments. Matching
//! is exact string comparison after trimming, no CIDR or normalization.
//!
//! The in-memory snapshot is immutable and replaced wholesale by the reload
//! loop with a single atomic swap, so handlers always observe a complete
//! set with no reader-side locking. External edits to the file become
//! effective at the next reload tick.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use tracing::{info, warn};

/// Default interval between blocklist reloads.
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(60);

/// Shared blocklist with lock-free reads and periodic file-backed reloads.
pub struct BlocklistStore {
    path: PathBuf,
    snapshot: ArcSwap<HashSet<String>>,
}

impl BlocklistStore {
    /// Open the store and perform the initial load.
    ///
    /// A missing backing file is created empty. Any other read failure is
    /// reported and the snapshot starts empty; the service still comes up.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self {
            path: path.into(),
            snapshot: ArcSwap::from_pointee(HashSet::new()),
        };

        match store.reload().await {
            Ok(count) => info!(count, path = %store.path.display(), "Blocklist loaded"),
            Err(e) => warn!(error = %e, "Failed to load blocklist; starting empty"),
        }

        store
    }

    /// Whether `addr` is present in the current snapshot.
    pub fn is_blocked(&self, addr: &str) -> bool {
        self.snapshot.load().contains(addr)
    }

    /// Number of addresses in the current snapshot.
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-read the backing file and atomically replace the snapshot.
    ///
    /// Returns the number of addresses loaded. On failure the previous
    /// snapshot is retained unchanged.
    pub async fn reload(&self) -> Result<usize> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = self.path.parent() {
                    tokio::fs::create_dir_all(parent).await.with_context(|| {
                        format!("Failed to create blocklist directory {}", parent.display())
                    })?;
                }
                tokio::fs::File::create(&self.path)
                    .await
                    .with_context(|| format!("Failed to create blocklist {}", self.path.display()))?;
                String::new()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read blocklist {}", self.path.display()))
            }
        };

        let set = parse_blocklist(&raw);
        let count = set.len();
        self.snapshot.store(Arc::new(set));
        Ok(count)
    }

    /// Periodic refresh for the process lifetime.
    ///
    /// The first tick fires one full interval after the initial load. A
    /// failed reload keeps the last-known-good snapshot and is non-fatal.
    pub async fn run_reload_loop(self: Arc<Self>, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            match self.reload().await {
                Ok(count) => info!(count, "Blocklist reloaded"),
                Err(e) => warn!(error = %e, "Blocklist reload failed; keeping previous snapshot"),
            }
        }
    }

    /// Add `addr` to the backing file.
    ///
    /// Returns `false` without touching the file if the address is already
    /// present. The in-memory snapshot is untouched either way; the edit
    /// becomes effective at the next reload tick, same as an external edit.
    pub async fn add(&self, addr: &str) -> Result<bool> {
        let addr = addr.trim();
        let raw = self.read_or_empty().await?;

        if parse_blocklist(&raw).contains(addr) {
            return Ok(false);
        }

        let mut content = raw;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(addr);
        content.push('\n');

        self.write_atomic(&content).await?;
        Ok(true)
    }

    /// Remove `addr` from the backing file, preserving comments and
    /// unrelated lines.
    ///
    /// Returns `false` without touching the file if the address is absent.
    pub async fn remove(&self, addr: &str) -> Result<bool> {
        let addr = addr.trim();
        let raw = self.read_or_empty().await?;

        if !parse_blocklist(&raw).contains(addr) {
            return Ok(false);
        }

        let mut content = String::with_capacity(raw.len());
        for line in raw.lines() {
            if line.trim() == addr {
                continue;
            }
            content.push_str(line);
            content.push('\n');
        }

        self.write_atomic(&content).await?;
        Ok(true)
    }

    async fn read_or_empty(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read blocklist {}", self.path.display()))
            }
        }
    }

    /// Write-to-temp then rename, so external readers never observe a
    /// partially written file. The core never holds a lock on the file.
    async fn write_atomic(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path).await.with_context(|| {
            format!(
                "Failed to move blocklist into place ({} -> {})",
                tmp.display(),
                self.path.display()
            )
        })?;

        Ok(())
    }

    /// Path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_blocklist(raw: &str) -> HashSet<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
