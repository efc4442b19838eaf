//! Durable outbound message queue.
//!
//! A local ledger mutation and the envelopes announcing it are committed
//! together: the vault persists the new entries first and only mutates its
//! ledger once the store has accepted them. A dispatcher later drains
//! pending entries through the bridge, retrying with exponential backoff
//! until the entry is dispatched or moves to the dead-letter state.
//!
//! Dispatched entries are kept for observation up to a retention limit,
//! then swept oldest first. The highest-nonce entry per destination always
//! survives so nonces resume correctly after a restart.
//!
//! Entry lifecycle:
//!
//! ```text
//! Pending --dispatch ok--> Dispatched
//!    |  ^
//!    |  +-- attempt failed, attempts < max (backoff)
//!    +----- attempt failed, attempts == max --> Failed --retry_failed--> Pending
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::chains::ChainId;
use crate::protocol::envelope::{Envelope, MessageId};
use crate::types::Amount;

// ============================================================================
// ENTRIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    /// Waiting for (re)dispatch
    Pending,
    /// Accepted by a bridge adapter; delivery is not confirmed
    Dispatched,
    /// Dead letter: retries exhausted or route no longer valid
    Failed,
}

/// One outbound envelope plus its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub envelope: Envelope,
    /// Fee share paid for this envelope
    pub fee: Amount,
    pub status: OutboxStatus,
    pub attempts: u32,
    /// Earliest time (unix ms) the next attempt may run
    pub next_attempt_ms: u64,
    pub last_error: Option<String>,
    pub protocol: Option<String>,
    pub delivery_id: Option<String>,
}

impl OutboxEntry {
    pub fn new(envelope: Envelope, fee: Amount) -> Self {
        Self {
            envelope,
            fee,
            status: OutboxStatus::Pending,
            attempts: 0,
            next_attempt_ms: 0,
            last_error: None,
            protocol: None,
            delivery_id: None,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.envelope.message_id
    }

    pub fn destination(&self) -> ChainId {
        self.envelope.destination_chain
    }
}

/// Retry schedule for failed dispatch attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts before an entry is dead-lettered
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32);
        self.base_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms)
    }
}

/// Default number of dispatched entries kept after delivery.
pub const DEFAULT_DISPATCHED_RETENTION: usize = 1_000;

// ============================================================================
// STORES
// ============================================================================

/// Persistence backend. `save` replaces the whole stored snapshot.
pub trait OutboxStore: Send + Sync {
    fn load(&self) -> Result<Vec<OutboxEntry>>;

    fn save(&mut self, entries: &[OutboxEntry]) -> Result<()>;
}

/// Store kept in memory. Clones share state, so a test can keep a handle,
/// reopen an outbox over the same data, or make writes fail.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOutboxStore {
    entries: Arc<Mutex<Vec<OutboxEntry>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save` fail while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<OutboxEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl OutboxStore for InMemoryOutboxStore {
    fn load(&self) -> Result<Vec<OutboxEntry>> {
        Ok(self.snapshot())
    }

    fn save(&mut self, entries: &[OutboxEntry]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("Outbox store is unavailable");
        }
        let mut stored = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *stored = entries.to_vec();
        Ok(())
    }
}

/// Store backed by a JSON file, replaced atomically via a temp file + rename.
#[derive(Debug, Clone)]
pub struct JsonFileOutboxStore {
    path: PathBuf,
}

impl JsonFileOutboxStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutboxStore for JsonFileOutboxStore {
    fn load(&self) -> Result<Vec<OutboxEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read outbox file: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse outbox file: {}", self.path.display()))
    }

    fn save(&mut self, entries: &[OutboxEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create outbox directory: {}", parent.display())
                })?;
            }
        }
        let json = serde_json::to_string_pretty(entries).context("Failed to serialize outbox")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write outbox file: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace outbox file: {}", self.path.display()))
    }
}

// ============================================================================
// OUTBOX
// ============================================================================

pub struct Outbox {
    store: Box<dyn OutboxStore>,
    policy: RetryPolicy,
    /// Dispatched entries kept before the oldest are swept
    retention: usize,
    /// Insertion order is dispatch order
    entries: Vec<OutboxEntry>,
}

impl Outbox {
    /// Opens an outbox over `store`, restoring any persisted entries.
    pub fn open(store: Box<dyn OutboxStore>, policy: RetryPolicy) -> Result<Self> {
        let entries = store.load().context("Failed to load outbox")?;
        if !entries.is_empty() {
            info!(
                "Restored {} outbox entries ({} pending)",
                entries.len(),
                entries
                    .iter()
                    .filter(|e| e.status == OutboxStatus::Pending)
                    .count()
            );
        }
        Ok(Self {
            store,
            policy,
            retention: DEFAULT_DISPATCHED_RETENTION,
            entries,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: Box::new(InMemoryOutboxStore::new()),
            policy: RetryPolicy::default(),
            retention: DEFAULT_DISPATCHED_RETENTION,
            entries: Vec::new(),
        }
    }

    /// Sets how many dispatched entries are retained.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Appends `new_entries` as one unit.
    ///
    /// Nothing is kept in memory unless the store accepted the whole batch.
    pub fn enqueue(&mut self, new_entries: Vec<OutboxEntry>) -> Result<()> {
        if new_entries.is_empty() {
            return Ok(());
        }
        self.sweep_dispatched();

        let committed = self.entries.len();
        self.entries.extend(new_entries);
        if let Err(e) = self.store.save(&self.entries) {
            self.entries.truncate(committed);
            return Err(e).context("Failed to persist outbox entries");
        }
        debug!("Outbox now holds {} entries", self.entries.len());
        Ok(())
    }

    pub fn get(&self, id: &MessageId) -> Option<&OutboxEntry> {
        self.entries.iter().find(|e| e.message_id() == *id)
    }

    pub fn status(&self, id: &MessageId) -> Option<OutboxStatus> {
        self.get(id).map(|e| e.status)
    }

    pub fn entries(&self) -> &[OutboxEntry] {
        &self.entries
    }

    pub fn count(&self, status: OutboxStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    /// Pending entries whose backoff has elapsed, in dispatch order.
    pub fn due(&self, now_ms: u64) -> Vec<OutboxEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending && e.next_attempt_ms <= now_ms)
            .cloned()
            .collect()
    }

    /// Highest nonce recorded per destination.
    pub fn max_nonces(&self) -> BTreeMap<ChainId, u64> {
        let mut nonces = BTreeMap::new();
        for entry in &self.entries {
            let slot = nonces.entry(entry.destination()).or_insert(0);
            *slot = (*slot).max(entry.envelope.nonce);
        }
        nonces
    }

    pub fn mark_dispatched(
        &mut self,
        id: &MessageId,
        protocol: &str,
        delivery_id: &str,
    ) -> Result<()> {
        let entry = self.entry_mut(id)?;
        entry.attempts = entry.attempts.saturating_add(1);
        entry.status = OutboxStatus::Dispatched;
        entry.protocol = Some(protocol.to_string());
        entry.delivery_id = Some(delivery_id.to_string());
        entry.last_error = None;
        self.sweep_dispatched();
        self.persist()
    }

    /// Records a failed attempt and schedules the next one, or dead-letters
    /// the entry once `max_attempts` is reached.
    pub fn mark_attempt_failed(
        &mut self,
        id: &MessageId,
        reason: &str,
        now_ms: u64,
    ) -> Result<OutboxStatus> {
        let policy = self.policy;
        let entry = self.entry_mut(id)?;
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_error = Some(reason.to_string());

        if entry.attempts >= policy.max_attempts {
            entry.status = OutboxStatus::Failed;
            warn!(
                "Outbox entry {} to {} dead-lettered after {} attempts: {}",
                entry.message_id(),
                entry.destination(),
                entry.attempts,
                reason
            );
        } else {
            let backoff = policy.backoff_ms(entry.attempts);
            entry.next_attempt_ms = now_ms.saturating_add(backoff);
            debug!(
                "Outbox entry {} attempt {} failed, retrying in {} ms: {}",
                entry.message_id(),
                entry.attempts,
                backoff,
                reason
            );
        }
        let status = entry.status;
        self.persist()?;
        Ok(status)
    }

    /// Dead-letters an entry without consuming retries.
    pub fn mark_failed(&mut self, id: &MessageId, reason: &str) -> Result<()> {
        let entry = self.entry_mut(id)?;
        entry.status = OutboxStatus::Failed;
        entry.last_error = Some(reason.to_string());
        warn!("Outbox entry {} failed: {}", entry.message_id(), reason);
        self.persist()
    }

    /// Moves a dead-lettered entry back to pending with a fresh retry budget.
    ///
    /// Returns `false` if the entry is not in the `Failed` state.
    pub fn retry_failed(&mut self, id: &MessageId, now_ms: u64) -> Result<bool> {
        let entry = self.entry_mut(id)?;
        if entry.status != OutboxStatus::Failed {
            return Ok(false);
        }
        entry.status = OutboxStatus::Pending;
        entry.attempts = 0;
        entry.next_attempt_ms = now_ms;
        info!("Outbox entry {} requeued", entry.message_id());
        self.persist()?;
        Ok(true)
    }

    /// Drops the oldest dispatched entries beyond the retention limit,
    /// keeping each destination's highest-nonce entry. Returns how many were
    /// dropped; the caller persists.
    fn sweep_dispatched(&mut self) -> usize {
        let dispatched = self.count(OutboxStatus::Dispatched);
        if dispatched <= self.retention {
            return 0;
        }

        let anchors = self.max_nonces();
        let mut excess = dispatched - self.retention;
        let before = self.entries.len();
        self.entries.retain(|e| {
            let anchor = anchors.get(&e.destination()) == Some(&e.envelope.nonce);
            if excess > 0 && e.status == OutboxStatus::Dispatched && !anchor {
                excess -= 1;
                return false;
            }
            true
        });

        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!("Swept {} dispatched outbox entries", dropped);
        }
        dropped
    }

    fn entry_mut(&mut self, id: &MessageId) -> Result<&mut OutboxEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.message_id() == *id)
            .ok_or_else(|| anyhow::anyhow!("Unknown outbox entry {}", id))
    }

    fn persist(&mut self) -> Result<()> {
        self.store
            .save(&self.entries)
            .context("Failed to persist outbox state")
    }
}
