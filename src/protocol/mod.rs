//! Cross-Chain Message Protocol
//!
//! Envelope encoding, trust, replay-guard and ordering repositories, and the per-chain
//! vault that ties the ledger to the bridge.

pub mod envelope;
pub mod registry;
pub mod vault;

pub use envelope::{Envelope, MessageId, SyncAction};
pub use registry::{
    InMemoryProcessedRegistry, InMemoryTrustRegistry, InMemoryWatermarkRegistry, ProcessedRegistry,
    SourceWatermark, TrustRegistry, WatermarkRegistry,
};
pub use vault::{
    split_fee, CrossChainVault, DispatchReport, FanOutReport, LocalReceipt, ReceiveOutcome,
    SyncReceipt,
};
