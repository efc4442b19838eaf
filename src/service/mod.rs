//! Background services
//!
//! - Outbox dispatcher: drains a vault's outbox through its bridge adapters
//! - Relay: delivers loopback mailbox traffic to destination vaults

pub mod dispatcher;
pub mod relay;

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::protocol::CrossChainVault;

/// Vault shared between services.
pub type SharedVault = Arc<RwLock<CrossChainVault>>;

pub fn share(vault: CrossChainVault) -> SharedVault {
    Arc::new(RwLock::new(vault))
}

pub use dispatcher::OutboxDispatcher;
pub use relay::{RelayReport, RelayService};
