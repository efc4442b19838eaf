//! Cross-chain vault: one chain's ledger plus its synchronization protocol.
//!
//! Outbound, a local operation is validated in full (fee, routes, ledger
//! rules), its envelopes are committed to the outbox, and only then is the
//! ledger mutated and the fee charged. The dispatcher delivers the outbox
//! later. Recovery operations (`manual_sync`, `reconcile`, `send`) dispatch
//! directly so adapter rejection surfaces to the caller.
//!
//! Inbound, an envelope goes through address, integrity, trust and replay
//! checks before it touches the ledger:
//!
//! ```text
//! Received -> addressed to us? -> id matches content? -> trusted sender?
//!          -> already processed? (Replayed) -> covered by the watermark? (Superseded)
//!          -> Applied
//! ```
//!
//! Nonces are per destination, so a receiver sees each (source chain, user)
//! stream in the sender's commit order even when delivery reorders it. A
//! delta at or below the last snapshot nonce is already part of that
//! snapshot; a snapshot at or below the highest applied nonce would roll
//! back newer deltas. Both are recorded as processed and skipped.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::envelope::{Envelope, MessageId, SyncAction};
use super::registry::{
    InMemoryProcessedRegistry, InMemoryTrustRegistry, InMemoryWatermarkRegistry, ProcessedRegistry,
    TrustRegistry, WatermarkRegistry,
};
use crate::bridge::{AdapterError, BridgeAdapter, BridgeManager};
use crate::chains::ChainId;
use crate::error::VaultError;
use crate::ledger::{LedgerAction, OutboundIntent, Position, PositionLedger, PositionSummary};
use crate::outbox::{Outbox, OutboxEntry, OutboxStatus};
use crate::types::{normalize_address, Amount};

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Outcome of a successfully validated inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Applied to the ledger and recorded as processed
    Applied,
    /// Already processed; nothing changed
    Replayed,
    /// Older than the last applied snapshot from the same source; recorded
    /// as processed without touching the ledger
    Superseded,
}

/// Result of a committed local operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalReceipt {
    pub intent: OutboundIntent,
    /// One queued envelope per peer, in peer order
    pub message_ids: Vec<MessageId>,
    pub fee_charged: Amount,
}

/// A directly dispatched envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReceipt {
    pub chain: ChainId,
    pub message_id: MessageId,
    pub protocol: String,
    pub delivery_id: String,
    pub fee: Amount,
}

/// Per-peer results of a direct fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub dispatched: Vec<SyncReceipt>,
    pub failed: Vec<(ChainId, VaultError)>,
}

impl FanOutReport {
    pub fn fee_charged(&self) -> Amount {
        self.dispatched.iter().map(|r| r.fee).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Counters for one outbox drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: usize,
    /// Failed attempts that will be retried after backoff
    pub retried: usize,
    /// Entries moved to the dead-letter state
    pub failed: usize,
}

impl DispatchReport {
    pub fn is_idle(&self) -> bool {
        self.dispatched == 0 && self.retried == 0 && self.failed == 0
    }
}

/// Envelope ready to hand to the bridge.
struct Prepared {
    chain: ChainId,
    vault: String,
    envelope: Envelope,
    payload: Vec<u8>,
    fee: Amount,
}

// ============================================================================
// VAULT
// ============================================================================

pub struct CrossChainVault {
    chain: ChainId,
    address: String,
    ledger: PositionLedger,
    bridge: BridgeManager,
    trust: Box<dyn TrustRegistry>,
    processed: Box<dyn ProcessedRegistry>,
    outbox: Outbox,
    /// Remote chains every local operation is announced to
    peers: BTreeSet<ChainId>,
    /// Next outbound nonce per destination
    nonces: BTreeMap<ChainId, u64>,
    /// Ordering state per (source chain, user)
    watermarks: Box<dyn WatermarkRegistry>,
    fee_balances: HashMap<String, Amount>,
    fees_collected: Amount,
    min_fee_floor: Amount,
}

impl CrossChainVault {
    /// Creates a vault with in-memory repositories.
    pub fn new(
        chain: ChainId,
        address: &str,
        collateral_ratio_bps: u128,
        min_fee_floor: Amount,
    ) -> Result<Self, VaultError> {
        Self::with_repositories(
            chain,
            address,
            collateral_ratio_bps,
            min_fee_floor,
            Box::new(InMemoryTrustRegistry::new()),
            Box::new(InMemoryProcessedRegistry::new()),
            Box::new(InMemoryWatermarkRegistry::new()),
            Outbox::in_memory(),
        )
    }

    /// Creates a vault over injected repositories.
    ///
    /// Outbound nonces resume after the highest nonce already in `outbox`
    /// so restarted vaults never reuse a message id. `watermarks` must be as
    /// durable as `processed`.
    #[allow(clippy::too_many_arguments)]
    pub fn with_repositories(
        chain: ChainId,
        address: &str,
        collateral_ratio_bps: u128,
        min_fee_floor: Amount,
        trust: Box<dyn TrustRegistry>,
        processed: Box<dyn ProcessedRegistry>,
        watermarks: Box<dyn WatermarkRegistry>,
        outbox: Outbox,
    ) -> Result<Self, VaultError> {
        let address = normalize_vault(address)?;
        let ledger = PositionLedger::new(chain, collateral_ratio_bps)?;
        let nonces = outbox
            .max_nonces()
            .into_iter()
            .map(|(dest, nonce)| (dest, nonce.saturating_add(1)))
            .collect();

        info!(
            "Vault {} on {} ready (ratio {} bps, min fee {})",
            address, chain, collateral_ratio_bps, min_fee_floor
        );
        Ok(Self {
            chain,
            address,
            ledger,
            bridge: BridgeManager::new(),
            trust,
            processed,
            outbox,
            peers: BTreeSet::new(),
            nonces,
            watermarks,
            fee_balances: HashMap::new(),
            fees_collected: 0,
            min_fee_floor,
        })
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn bridge(&self) -> &BridgeManager {
        &self.bridge
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn min_fee_floor(&self) -> Amount {
        self.min_fee_floor
    }

    pub fn summary(&self, user: &str) -> PositionSummary {
        self.ledger.summary(user)
    }

    pub fn position(&self, user: &str, chain: ChainId) -> Position {
        self.ledger.position(user, chain)
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Sets the only vault accepted from, and addressed on, `chain`.
    pub fn set_trusted_vault(&mut self, chain: ChainId, address: &str) -> Result<(), VaultError> {
        if chain == self.chain {
            return Err(VaultError::InvalidConfiguration(format!(
                "Cannot set a trusted remote for the local chain {}",
                chain
            )));
        }
        let address = normalize_vault(address)?;
        info!("Trusted vault for {} set to {}", chain, address);
        self.trust.set_trusted(chain, address);
        Ok(())
    }

    pub fn trusted_vault(&self, chain: ChainId) -> Option<String> {
        self.trust.trusted(chain)
    }

    /// Adds a remote chain that local operations are announced to.
    pub fn add_peer(&mut self, chain: ChainId) -> Result<(), VaultError> {
        if chain == self.chain {
            return Err(VaultError::InvalidConfiguration(format!(
                "Vault on {} cannot peer with itself",
                chain
            )));
        }
        if self.peers.insert(chain) {
            info!("Vault on {} now syncs to {}", self.chain, chain);
        }
        Ok(())
    }

    pub fn peers(&self) -> Vec<ChainId> {
        self.peers.iter().copied().collect()
    }

    pub fn register_adapter(&mut self, adapter: Arc<dyn BridgeAdapter>) -> Result<(), VaultError> {
        self.bridge.register(adapter)
    }

    pub fn set_preferred_protocol(&mut self, chain: ChainId, protocol: &str) -> Result<(), VaultError> {
        self.bridge.set_preferred(chain, protocol)
    }

    /// Credits `user` with bridge fee funds.
    pub fn fund_fees(&mut self, user: &str, amount: Amount) {
        let balance = self.fee_balances.entry(user.to_string()).or_insert(0);
        *balance = balance.saturating_add(amount);
        debug!("Fee balance of {} is now {}", user, balance);
    }

    pub fn fee_balance(&self, user: &str) -> Amount {
        self.fee_balances.get(user).copied().unwrap_or(0)
    }

    /// Total fees charged by this vault.
    pub fn fees_collected(&self) -> Amount {
        self.fees_collected
    }

    /// Adds protocol-owned liquidity to the local pool.
    pub fn fund_reserve(&mut self, amount: Amount) {
        self.ledger.fund_reserve(amount);
        info!("Reserve on {} funded with {}", self.chain, amount);
    }

    pub fn outbox_status(&self, id: &MessageId) -> Option<OutboxStatus> {
        self.outbox.status(id)
    }

    /// Requeues a dead-lettered outbox entry.
    pub fn retry_failed(&mut self, id: &MessageId, now_ms: u64) -> Result<bool, VaultError> {
        self.outbox
            .retry_failed(id, now_ms)
            .map_err(|e| VaultError::Persistence(format!("{:#}", e)))
    }

    pub fn is_processed(&self, id: &MessageId) -> bool {
        self.processed.contains(id)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    // ========================================================================
    // Local operations
    // ========================================================================

    pub fn deposit(&mut self, user: &str, amount: Amount, fee: Amount) -> Result<LocalReceipt, VaultError> {
        self.execute_local(user, LedgerAction::Deposit, amount, fee)
    }

    pub fn withdraw(&mut self, user: &str, amount: Amount, fee: Amount) -> Result<LocalReceipt, VaultError> {
        self.execute_local(user, LedgerAction::Withdraw, amount, fee)
    }

    pub fn borrow(&mut self, user: &str, amount: Amount, fee: Amount) -> Result<LocalReceipt, VaultError> {
        self.execute_local(user, LedgerAction::Borrow, amount, fee)
    }

    pub fn repay(&mut self, user: &str, amount: Amount, fee: Amount) -> Result<LocalReceipt, VaultError> {
        self.execute_local(user, LedgerAction::Repay, amount, fee)
    }

    /// Validates, enqueues, then commits a local operation.
    ///
    /// # Arguments
    ///
    /// * `user` - Position owner, also the fee payer
    /// * `action` - Ledger mutation
    /// * `amount` - Mutation amount
    /// * `fee` - Bridge fee, split evenly across peers
    ///
    /// # Returns
    ///
    /// * `Ok(LocalReceipt)` - Mutation committed and envelopes queued
    /// * `Err(VaultError)` - Nothing changed
    fn execute_local(
        &mut self,
        user: &str,
        action: LedgerAction,
        amount: Amount,
        fee: Amount,
    ) -> Result<LocalReceipt, VaultError> {
        self.check_fee(user, fee)?;

        let peers = self.peers();
        let prepared = self.prepare(
            &peers,
            SyncAction::from_ledger(action),
            user,
            amount,
            0,
            fee,
        )?;
        self.ledger.validate(user, action, amount)?;

        let entries: Vec<OutboxEntry> = prepared
            .iter()
            .map(|p| OutboxEntry::new(p.envelope.clone(), p.fee))
            .collect();
        self.outbox
            .enqueue(entries)
            .map_err(|e| VaultError::Persistence(format!("{:#}", e)))?;

        for p in &prepared {
            self.commit_nonce(p.chain, p.envelope.nonce);
        }
        let intent = self.ledger.apply_local(user, action, amount)?;
        self.charge_fee(user, fee);

        info!(
            "{:?} of {} for {} on {} committed, {} envelope(s) queued",
            action,
            amount,
            user,
            self.chain,
            prepared.len()
        );
        Ok(LocalReceipt {
            intent,
            message_ids: prepared.iter().map(|p| p.envelope.message_id).collect(),
            fee_charged: fee,
        })
    }

    // ========================================================================
    // Recovery operations
    // ========================================================================

    /// Re-asserts this chain's current balances for `user` to `dest`.
    ///
    /// Dispatches immediately. On success only the fee balance changes; on
    /// failure nothing does.
    pub fn manual_sync(&mut self, user: &str, dest: ChainId, fee: Amount) -> Result<SyncReceipt, VaultError> {
        if dest == self.chain {
            return Err(VaultError::InvalidConfiguration(format!(
                "Cannot sync {} to its own chain",
                self.chain
            )));
        }
        self.check_fee(user, fee)?;

        let local = self.ledger.position(user, self.chain);
        let mut prepared = self.prepare(
            &[dest],
            SyncAction::ManualSync,
            user,
            local.collateral,
            local.borrowed,
            fee,
        )?;
        let p = prepared
            .pop()
            .ok_or_else(|| VaultError::InvalidConfiguration(format!("No route to {}", dest)))?;

        let receipt = self.dispatch_prepared(p)?;
        self.charge_fee(user, receipt.fee);
        info!(
            "Manual sync of {} from {} to {} dispatched as {}",
            user, self.chain, dest, receipt.message_id
        );
        Ok(receipt)
    }

    /// Re-asserts this chain's current balances for `user` to every peer.
    ///
    /// All routes are validated before anything is sent. Peers whose adapter
    /// rejects the envelope are reported in `failed` and their fee share is
    /// not charged.
    pub fn reconcile(&mut self, user: &str, fee: Amount) -> Result<FanOutReport, VaultError> {
        let local = self.ledger.position(user, self.chain);
        let report = self.fan_out(SyncAction::Reconcile, user, local.collateral, local.borrowed, fee)?;
        info!(
            "Reconcile of {} from {}: {} dispatched, {} failed",
            user,
            self.chain,
            report.dispatched.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Dispatches one delta notification directly to every peer without
    /// touching the local ledger.
    ///
    /// Receivers apply it as a fresh event, so this is only for announcing a
    /// committed mutation whose original envelope was lost.
    pub fn send(
        &mut self,
        action: SyncAction,
        user: &str,
        amount: Amount,
        fee: Amount,
    ) -> Result<FanOutReport, VaultError> {
        if action.is_snapshot() {
            return Err(VaultError::InvalidConfiguration(format!(
                "{:?} carries a snapshot; use manual_sync or reconcile",
                action
            )));
        }
        if amount == 0 {
            return Err(crate::ledger::LedgerError::ZeroAmount.into());
        }
        self.fan_out(action, user, amount, 0, fee)
    }

    fn fan_out(
        &mut self,
        action: SyncAction,
        user: &str,
        amount: Amount,
        borrowed: Amount,
        fee: Amount,
    ) -> Result<FanOutReport, VaultError> {
        if self.peers.is_empty() {
            return Err(VaultError::InvalidConfiguration(format!(
                "Vault on {} has no peers",
                self.chain
            )));
        }
        self.check_fee(user, fee)?;

        let peers = self.peers();
        let prepared = self.prepare(&peers, action, user, amount, borrowed, fee)?;

        let mut report = FanOutReport::default();
        for p in prepared {
            let chain = p.chain;
            match self.dispatch_prepared(p) {
                Ok(receipt) => {
                    self.charge_fee(user, receipt.fee);
                    report.dispatched.push(receipt);
                }
                Err(e) => {
                    warn!("{:?} for {} to {} failed: {}", action, user, chain, e);
                    report.failed.push((chain, e));
                }
            }
        }
        Ok(report)
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Validates and applies an inbound envelope.
    ///
    /// # Returns
    ///
    /// * `Ok(ReceiveOutcome)` - Envelope accepted (applied, replayed or superseded)
    /// * `Err(VaultError)` - Envelope rejected; ledger and processed set unchanged
    pub fn receive(&mut self, envelope: &Envelope) -> Result<ReceiveOutcome, VaultError> {
        if envelope.destination_chain != self.chain || envelope.destination_vault != self.address {
            warn!(
                "Rejected envelope {} addressed to {} on {}",
                envelope.message_id, envelope.destination_vault, envelope.destination_chain
            );
            return Err(VaultError::MisaddressedEnvelope {
                chain: envelope.destination_chain,
                vault: envelope.destination_vault.clone(),
            });
        }

        if !envelope.has_valid_id() {
            warn!("Rejected envelope {}: id does not match content", envelope.message_id);
            return Err(VaultError::MalformedEnvelope(format!(
                "message id {} does not match content",
                envelope.message_id
            )));
        }

        if !self.trust.is_trusted(envelope.source_chain, &envelope.source_vault) {
            warn!(
                "Rejected envelope {} from untrusted sender {} on {}",
                envelope.message_id, envelope.source_vault, envelope.source_chain
            );
            return Err(VaultError::UntrustedSender {
                chain: envelope.source_chain,
                vault: envelope.source_vault.clone(),
            });
        }

        if self.processed.contains(&envelope.message_id) {
            debug!("Envelope {} already processed", envelope.message_id);
            return Ok(ReceiveOutcome::Replayed);
        }

        let mut watermark = self.watermarks.get(envelope.source_chain, &envelope.user);
        let covered = match envelope.action.as_delta() {
            Some(_) => watermark.covers_delta(envelope.nonce),
            None => watermark.covers_snapshot(envelope.nonce),
        };
        if covered {
            self.processed.insert(envelope.message_id);
            info!(
                "Envelope {} ({:?}, nonce {}) from {} superseded by {:?}",
                envelope.message_id,
                envelope.action,
                envelope.nonce,
                envelope.source_chain,
                watermark
            );
            return Ok(ReceiveOutcome::Superseded);
        }

        match envelope.action.as_delta() {
            Some(action) => {
                self.ledger.apply_remote_delta(
                    &envelope.user,
                    envelope.source_chain,
                    action,
                    envelope.amount,
                )?;
                watermark.record_delta(envelope.nonce);
            }
            None => {
                self.ledger.apply_remote_snapshot(
                    &envelope.user,
                    envelope.source_chain,
                    Position {
                        collateral: envelope.amount,
                        borrowed: envelope.borrowed,
                    },
                )?;
                watermark.record_snapshot(envelope.nonce);
            }
        }
        self.watermarks
            .set(envelope.source_chain, &envelope.user, watermark);
        self.processed.insert(envelope.message_id);

        info!(
            "Applied {:?} of {} for {} from {} ({})",
            envelope.action,
            envelope.amount,
            envelope.user,
            envelope.source_chain,
            envelope.message_id
        );
        Ok(ReceiveOutcome::Applied)
    }

    // ========================================================================
    // Outbox dispatch
    // ========================================================================

    /// Hands every due outbox entry to the bridge.
    ///
    /// An entry whose destination vault no longer matches the trust link is
    /// dead-lettered instead of being sent to a stale address.
    pub fn dispatch_pending(&mut self, now_ms: u64) -> DispatchReport {
        let mut report = DispatchReport::default();

        for entry in self.outbox.due(now_ms) {
            let id = entry.message_id();
            let dest = entry.destination();
            let dest_vault = &entry.envelope.destination_vault;

            if !self.trust.is_trusted(dest, dest_vault) {
                let reason = format!("Trust link for {} no longer names {}", dest, dest_vault);
                if let Err(e) = self.outbox.mark_failed(&id, &reason) {
                    error!("Failed to record outbox failure for {}: {:#}", id, e);
                }
                report.failed += 1;
                continue;
            }

            let result = entry
                .envelope
                .encode()
                .and_then(|payload| self.bridge.dispatch(dest, dest_vault, &payload, entry.fee));

            match result {
                Ok(receipt) => {
                    if let Err(e) = self
                        .outbox
                        .mark_dispatched(&id, &receipt.protocol, &receipt.delivery_id)
                    {
                        error!("Failed to record dispatch of {}: {:#}", id, e);
                    }
                    report.dispatched += 1;
                }
                Err(err) => match self.outbox.mark_attempt_failed(&id, &err.to_string(), now_ms) {
                    Ok(OutboxStatus::Failed) => report.failed += 1,
                    Ok(_) => report.retried += 1,
                    Err(e) => {
                        error!("Failed to record dispatch failure of {}: {:#}", id, e);
                        report.retried += 1;
                    }
                },
            }
        }

        if !report.is_idle() {
            debug!("Outbox drain on {}: {:?}", self.chain, report);
        }
        report
    }

    // ========================================================================
    // Internal methods
    // ========================================================================

    fn check_fee(&self, user: &str, fee: Amount) -> Result<(), VaultError> {
        if fee < self.min_fee_floor {
            return Err(VaultError::InsufficientFee {
                provided: fee,
                floor: self.min_fee_floor,
            });
        }
        let available = self.fee_balance(user);
        if available < fee {
            return Err(VaultError::InsufficientFeeBalance {
                available,
                required: fee,
            });
        }
        Ok(())
    }

    /// Resolves routes to `targets`, splits `fee` and composes one envelope
    /// per target. Fails closed on the first missing trust link or route.
    fn prepare(
        &self,
        targets: &[ChainId],
        action: SyncAction,
        user: &str,
        amount: Amount,
        borrowed: Amount,
        fee: Amount,
    ) -> Result<Vec<Prepared>, VaultError> {
        let mut routes = Vec::with_capacity(targets.len());
        for chain in targets {
            let vault = self
                .trust
                .trusted(*chain)
                .ok_or(VaultError::UntrustedDestination(*chain))?;
            self.bridge.resolve(*chain)?;
            routes.push((*chain, vault));
        }

        let shares = split_fee(fee, routes.len());
        let mut prepared = Vec::with_capacity(routes.len());
        let mut max_quote: Amount = 0;
        let mut underpaid = false;

        for ((chain, vault), share) in routes.into_iter().zip(shares) {
            let envelope = Envelope::compose(
                self.chain,
                &self.address,
                chain,
                &vault,
                action,
                user,
                amount,
                borrowed,
                self.next_nonce(chain),
            )?;
            let payload = envelope.encode()?;

            match self.bridge.estimate_fee(chain, &payload) {
                Ok(quote) => {
                    max_quote = max_quote.max(quote);
                    underpaid |= share < quote;
                }
                Err(VaultError::Delivery(AdapterError::Transport(reason))) => {
                    warn!("Fee quote for {} unavailable, skipping pre-flight: {}", chain, reason);
                }
                Err(e) => return Err(e),
            }

            prepared.push(Prepared {
                chain,
                vault,
                envelope,
                payload,
                fee: share,
            });
        }

        if underpaid {
            return Err(VaultError::InsufficientFee {
                provided: fee,
                floor: max_quote.saturating_mul(prepared.len() as Amount),
            });
        }
        Ok(prepared)
    }

    /// Sends a prepared envelope and records it in the outbox as dispatched.
    fn dispatch_prepared(&mut self, p: Prepared) -> Result<SyncReceipt, VaultError> {
        let receipt = self.bridge.dispatch(p.chain, &p.vault, &p.payload, p.fee)?;
        self.commit_nonce(p.chain, p.envelope.nonce);

        let message_id = p.envelope.message_id;
        let mut entry = OutboxEntry::new(p.envelope, p.fee);
        entry.status = OutboxStatus::Dispatched;
        entry.attempts = 1;
        entry.protocol = Some(receipt.protocol.clone());
        entry.delivery_id = Some(receipt.delivery_id.clone());
        if let Err(e) = self.outbox.enqueue(vec![entry]) {
            error!("Dispatched {} but failed to record it: {:#}", message_id, e);
        }

        Ok(SyncReceipt {
            chain: p.chain,
            message_id,
            protocol: receipt.protocol,
            delivery_id: receipt.delivery_id,
            fee: p.fee,
        })
    }

    fn next_nonce(&self, chain: ChainId) -> u64 {
        self.nonces.get(&chain).copied().unwrap_or(0)
    }

    fn commit_nonce(&mut self, chain: ChainId, used: u64) {
        let next = self.nonces.entry(chain).or_insert(0);
        *next = (*next).max(used.saturating_add(1));
    }

    fn charge_fee(&mut self, user: &str, fee: Amount) {
        if fee == 0 {
            return;
        }
        let balance = self.fee_balances.entry(user.to_string()).or_insert(0);
        *balance = balance.saturating_sub(fee);
        self.fees_collected = self.fees_collected.saturating_add(fee);
    }
}

/// Splits `fee` evenly into `parts` shares; the remainder goes to the first.
pub fn split_fee(fee: Amount, parts: usize) -> Vec<Amount> {
    if parts == 0 {
        return Vec::new();
    }
    let base = fee / parts as Amount;
    let remainder = fee - base * parts as Amount;
    let mut shares = vec![base; parts];
    shares[0] += remainder;
    shares
}

fn normalize_vault(address: &str) -> Result<String, VaultError> {
    normalize_address(address).map_err(|e| VaultError::InvalidAddress(e.to_string()))
}
