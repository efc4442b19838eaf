//! Trust, replay-guard and ordering repositories.
//!
//! All three tables are injected into the vault at construction so
//! deployments can back them with durable storage and tests can substitute
//! fakes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::envelope::MessageId;
use crate::chains::ChainId;

/// Trusted remote vault per chain.
///
/// The same link authorizes inbound senders and addresses outbound envelopes.
pub trait TrustRegistry: Send + Sync {
    fn set_trusted(&mut self, chain: ChainId, vault: String);

    fn trusted(&self, chain: ChainId) -> Option<String>;

    fn is_trusted(&self, chain: ChainId, vault: &str) -> bool {
        self.trusted(chain).as_deref() == Some(vault)
    }

    /// All configured links, ordered by chain.
    fn links(&self) -> Vec<(ChainId, String)>;
}

/// Message ids already applied to the local ledger. Never pruned.
pub trait ProcessedRegistry: Send + Sync {
    fn contains(&self, id: &MessageId) -> bool;

    /// Records `id`; returns `false` if it was already present.
    fn insert(&mut self, id: MessageId) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordering state of one (source chain, user) stream as seen by a receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceWatermark {
    /// Nonce of the last applied snapshot
    pub snapshot: Option<u64>,
    /// Highest nonce applied from this stream, delta or snapshot
    pub highest_applied: Option<u64>,
}

impl SourceWatermark {
    /// Deltas at or below the last snapshot are already part of it.
    pub fn covers_delta(&self, nonce: u64) -> bool {
        matches!(self.snapshot, Some(snapshot) if nonce <= snapshot)
    }

    /// A snapshot older than anything applied would roll back newer deltas.
    pub fn covers_snapshot(&self, nonce: u64) -> bool {
        matches!(self.highest_applied, Some(highest) if nonce <= highest)
    }

    pub fn record_delta(&mut self, nonce: u64) {
        self.highest_applied = Some(self.highest_applied.map_or(nonce, |h| h.max(nonce)));
    }

    pub fn record_snapshot(&mut self, nonce: u64) {
        self.snapshot = Some(nonce);
        self.record_delta(nonce);
    }
}

/// Per-(source chain, user) ordering state. Must be as durable as the
/// [`ProcessedRegistry`] it is deployed with.
pub trait WatermarkRegistry: Send + Sync {
    fn get(&self, chain: ChainId, user: &str) -> SourceWatermark;

    fn set(&mut self, chain: ChainId, user: &str, watermark: SourceWatermark);
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTrustRegistry {
    links: BTreeMap<ChainId, String>,
}

impl InMemoryTrustRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrustRegistry for InMemoryTrustRegistry {
    fn set_trusted(&mut self, chain: ChainId, vault: String) {
        self.links.insert(chain, vault);
    }

    fn trusted(&self, chain: ChainId) -> Option<String> {
        self.links.get(&chain).cloned()
    }

    fn links(&self) -> Vec<(ChainId, String)> {
        self.links
            .iter()
            .map(|(chain, vault)| (*chain, vault.clone()))
            .collect()
    }
}

/// Processed ids kept in memory. Clones share state, so a restarted vault
/// can be reopened over the same set.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProcessedRegistry {
    ids: Arc<Mutex<HashSet<MessageId>>>,
}

impl InMemoryProcessedRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessedRegistry for InMemoryProcessedRegistry {
    fn contains(&self, id: &MessageId) -> bool {
        lock(&self.ids).contains(id)
    }

    fn insert(&mut self, id: MessageId) -> bool {
        lock(&self.ids).insert(id)
    }

    fn len(&self) -> usize {
        lock(&self.ids).len()
    }
}

/// Watermarks kept in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWatermarkRegistry {
    watermarks: Arc<Mutex<HashMap<(ChainId, String), SourceWatermark>>>,
}

impl InMemoryWatermarkRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatermarkRegistry for InMemoryWatermarkRegistry {
    fn get(&self, chain: ChainId, user: &str) -> SourceWatermark {
        lock(&self.watermarks)
            .get(&(chain, user.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn set(&mut self, chain: ChainId, user: &str, watermark: SourceWatermark) {
        lock(&self.watermarks).insert((chain, user.to_string()), watermark);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
