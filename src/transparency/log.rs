//! Local delivery audit.
//!
//! Counts what the tracker built, sent, stored and reported, so a user can
//! see how much was transmitted on their behalf. Only counters are kept,
//! never hit contents.

use crate::delegate::{HitStatus, TrackerDelegate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Delivery counters for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Builds that produced hits
    builds: AtomicU64,
    /// Builds rejected (incomplete configuration)
    builds_failed: AtomicU64,
    /// Hits delivered
    hits_sent: AtomicU64,
    /// Delivery attempts that failed
    hits_failed: AtomicU64,
    /// Hits written to offline storage
    hits_saved: AtomicU64,
    warnings: AtomicU64,
    errors: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            builds: AtomicU64::new(0),
            builds_failed: AtomicU64::new(0),
            hits_sent: AtomicU64::new(0),
            hits_failed: AtomicU64::new(0),
            hits_saved: AtomicU64::new(0),
            warnings: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that continues the counters stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous delivery stats: {e}");
        }

        log
    }

    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            builds: self.builds.load(Ordering::Relaxed),
            builds_failed: self.builds_failed.load(Ordering::Relaxed),
            hits_sent: self.hits_sent.load(Ordering::Relaxed),
            hits_failed: self.hits_failed.load(Ordering::Relaxed),
            hits_saved: self.hits_saved.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Delivery Statistics:\n\
             - Builds: {} ({} rejected)\n\
             - Hits sent: {}\n\
             - Failed attempts: {}\n\
             - Hits stored offline: {}\n\
             - Warnings: {}\n\
             - Errors: {}\n\
             - Session duration: {} seconds",
            stats.builds,
            stats.builds_failed,
            stats.hits_sent,
            stats.hits_failed,
            stats.hits_saved,
            stats.warnings,
            stats.errors,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                builds: stats.builds,
                builds_failed: stats.builds_failed,
                hits_sent: stats.hits_sent,
                hits_failed: stats.hits_failed,
                hits_saved: stats.hits_saved,
                warnings: stats.warnings,
                errors: stats.errors,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.builds.store(persisted.builds, Ordering::Relaxed);
                self.builds_failed
                    .store(persisted.builds_failed, Ordering::Relaxed);
                self.hits_sent.store(persisted.hits_sent, Ordering::Relaxed);
                self.hits_failed.store(persisted.hits_failed, Ordering::Relaxed);
                self.hits_saved.store(persisted.hits_saved, Ordering::Relaxed);
                self.warnings.store(persisted.warnings, Ordering::Relaxed);
                self.errors.store(persisted.errors, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.builds,
            &self.builds_failed,
            &self.hits_sent,
            &self.hits_failed,
            &self.hits_saved,
            &self.warnings,
            &self.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerDelegate for TransparencyLog {
    fn build_did_end(&self, status: HitStatus, _message: &str) {
        match status {
            HitStatus::Success => self.builds.fetch_add(1, Ordering::Relaxed),
            HitStatus::Failed => self.builds_failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn send_did_end(&self, status: HitStatus, _message: &str) {
        match status {
            HitStatus::Success => self.hits_sent.fetch_add(1, Ordering::Relaxed),
            HitStatus::Failed => self.hits_failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn save_did_end(&self, _message: &str) {
        self.hits_saved.fetch_add(1, Ordering::Relaxed);
    }

    fn warning_did_occur(&self, _message: &str) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
    }

    fn error_did_occur(&self, _message: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of delivery statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub builds: u64,
    pub builds_failed: u64,
    pub hits_sent: u64,
    pub hits_failed: u64,
    pub hits_saved: u64,
    pub warnings: u64,
    pub errors: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    builds: u64,
    builds_failed: u64,
    hits_sent: u64,
    hits_failed: u64,
    hits_saved: u64,
    warnings: u64,
    errors: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
