// =============================================================================
// dedup.rs — THE ONCE-A-DAY GATEKEEPER
// =============================================================================
//
// Tracks which (company, result-variant) pairs have already been notified
// today, so the channel hears about each announcement exactly once per
// calendar day no matter how many poll cycles re-fetch it.
//
// The state is a plain exact set, persisted as JSON and reloaded across
// restarts. Persistence is write-temp-then-rename: the state file is
// never half-written on disk, so a crash mid-write leaves the previous
// complete state instead of a corrupt one.
//
// The contract with the delivery pipeline:
//
//   - `rollover_if_stale` runs at the start of every poll cycle, before
//     any lookup. Crossing local midnight wipes the set.
//   - `should_notify` is read-only.
//   - `commit` runs only after a delivery is confirmed fully sent.
//
// A crash between send and commit means the record is re-sent on restart.
// That is the deal: at-least-once. A duplicate notification is annoying;
// a silently lost one is a defect.
// =============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::DedupKey;

/// On-disk shape: the calendar day it applies to plus every key notified
/// on that day.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    date: NaiveDate,
    sent: Vec<SentEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SentEntry {
    company: String,
    variant: String,
    timestamp: DateTime<Local>,
}

/// The per-day dedup set. Owned by the delivery pipeline; single-writer.
#[derive(Debug)]
pub struct DedupTracker {
    path: PathBuf,
    date: NaiveDate,
    sent: HashMap<DedupKey, DateTime<Local>>,
}

impl DedupTracker {
    /// Load state from disk. A missing file, a corrupt file, or a file
    /// dated to some other day all load as an empty set for `today` —
    /// the worst case of discarding state is a duplicate notification,
    /// which is the accepted failure mode.
    pub async fn load(path: impl Into<PathBuf>, today: NaiveDate) -> Self {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    warn!(path = %parent.display(), error = %e, "could not create dedup state directory");
                }
            }
        }

        let sent = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<PersistedState>(&bytes) {
                Ok(state) if state.date == today => {
                    info!(
                        path = %path.display(),
                        entries = state.sent.len(),
                        "loaded dedup state for today"
                    );
                    state
                        .sent
                        .into_iter()
                        .map(|e| (DedupKey::new(e.company, e.variant), e.timestamp))
                        .collect()
                }
                Ok(state) => {
                    info!(
                        stored_date = %state.date,
                        today = %today,
                        "dedup state is from another day — starting fresh"
                    );
                    HashMap::new()
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "dedup state file is unreadable — starting fresh (duplicates possible)"
                    );
                    HashMap::new()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "no dedup state file — starting fresh");
                HashMap::new()
            }
        };

        Self {
            path,
            date: today,
            sent,
        }
    }

    /// True when this key has not yet been notified today.
    pub fn should_notify(&self, key: &DedupKey) -> bool {
        !self.sent.contains_key(key)
    }

    /// Record a confirmed delivery and persist the updated state.
    pub async fn commit(&mut self, key: DedupKey, timestamp: DateTime<Local>) -> Result<()> {
        self.sent.insert(key, timestamp);
        self.persist().await
    }

    /// Reset the set when the stored date no longer matches the current
    /// local date. Must run at the start of every poll cycle, before any
    /// `should_notify` call.
    pub async fn rollover_if_stale(&mut self, today: NaiveDate) -> Result<()> {
        if self.date == today {
            return Ok(());
        }
        info!(
            previous = %self.date,
            today = %today,
            cleared = self.sent.len(),
            "midnight rollover — dedup state reset for the new day"
        );
        self.date = today;
        self.sent.clear();
        self.persist().await
    }

    /// Number of keys committed today.
    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }

    /// Atomically overwrite the state file: write a sibling temp file,
    /// then rename over the target.
    async fn persist(&self) -> Result<()> {
        let state = PersistedState {
            date: self.date,
            sent: self
                .sent
                .iter()
                .map(|(key, timestamp)| SentEntry {
                    company: key.company.clone(),
                    variant: key.variant.clone(),
                    timestamp: *timestamp,
                })
                .collect(),
        };

        let json = serde_json::to_vec_pretty(&state).context("serializing dedup state")?;
        let tmp = temp_path(&self.path);

        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("writing dedup state to {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming dedup state into {}", self.path.display()))?;

        debug!(path = %self.path.display(), entries = state.sent.len(), "dedup state persisted");
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
