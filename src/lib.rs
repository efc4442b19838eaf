//! Cross-chain collateral vault library
//!
//! Per-chain position ledgers kept in sync over pluggable bridges, with
//! manual recovery, a durable outbox and a multi-source liquidity router.

pub mod bridge;
pub mod chains;
pub mod config;
pub mod devnet;
pub mod error;
pub mod ledger;
pub mod oracle;
pub mod outbox;
pub mod protocol;
pub mod rates;
pub mod router;
pub mod service;
pub mod types;

// Re-export public types for convenience
pub use bridge::{
    AdapterError, BridgeAdapter, BridgeManager, DeliveryReceipt, FeeModel, HttpRelayAdapter,
    LoopbackAdapter, Mailbox,
};
pub use chains::{ChainId, ChainNameTable};
pub use config::VaultConfig;
pub use error::VaultError;
pub use ledger::{LedgerAction, LedgerError, Position, PositionLedger, PositionSummary};
pub use outbox::{Outbox, OutboxEntry, OutboxStatus, RetryPolicy};
pub use protocol::{CrossChainVault, Envelope, MessageId, ReceiveOutcome, SyncAction};
pub use router::{BorrowPlan, BorrowRequest, LiquidityQuote, LiquidityRouter, LiquiditySource};
pub use types::Amount;
