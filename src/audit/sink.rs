//! Audit sink — append-only record of every (action, verdict) pair.
//!
//! One JSON object per line, flushed on every write for crash safety. The
//! `AuditSink` trait lets the gate be composed over any durable append
//! target; `FileAuditSink` is the one concrete implementation this crate
//! ships.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::audit::types::AuditEntry;
use crate::policy::types::{Action, Verdict};

/// `append(action, verdict)`. A subsequent crash must not reorder or lose
/// entries for which `append` has already returned.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, action: Action, verdict: Verdict);
}

/// Line-oriented append-only JSONL file: open-once, append-mode,
/// flush-per-write.
pub struct FileAuditSink {
    log_path: PathBuf,
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Open (creating if needed) a JSONL file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let log_path = path.as_ref().to_path_buf();
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create audit directory: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open audit log: {}", log_path.display()))?;

        Ok(Self {
            log_path,
            file: Mutex::new(file),
        })
    }

    /// Default audit directory, `~/.acp-gate/audit/`.
    pub fn default_directory() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".acp-gate").join("audit"))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn write_line(&self, entry: &AuditEntry) -> Result<()> {
        let json = serde_json::to_string(entry).context("Failed to serialize audit entry")?;
        let mut file = self.file.lock().unwrap();
        writeln!(file, "{}", json).context("Failed to write audit entry")?;
        file.flush().context("Failed to flush audit log")?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn append(&self, action: Action, verdict: Verdict) {
        let entry = AuditEntry::new(action, verdict);
        if let Err(err) = self.write_line(&entry) {
            tracing::error!(error = %err, "failed to append audit entry");
        }
    }
}

/// In-memory sink used by tests that need to assert on what was recorded.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, action: Action, verdict: Verdict) {
        let entry = AuditEntry::new(action, verdict);
        self.entries.lock().unwrap().push(entry);
    }
}
