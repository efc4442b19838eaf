//! HTTP Relay Adapter
//!
//! Delivers messages through an external relay service over HTTP. The relay
//! answers with the same response wrapper used across the framework:
//!
//! ```json
//! { "success": true|false, "data": <payload>|null, "error": <message>|null }
//! ```
//!
//! Endpoints:
//! - `GET  /fee/:chain?payload_len=N` -> `{ "fee": "<amount>" }`
//! - `POST /messages`                -> `{ "delivery_id": "<id>" }`

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{AdapterError, BridgeAdapter, DeliveryId};
use crate::chains::{ChainId, ChainNameTable};
use crate::types::Amount;

// ============================================================================
// API STRUCTURES
// ============================================================================

/// Standardized response structure from the relay API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// Fee quote returned by `GET /fee/:chain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeQuoteResponse {
    /// Decimal string, amounts may exceed JSON number precision
    pub fee: String,
}

/// Body of `POST /messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayMessageRequest {
    /// Source chain, as named by this protocol
    pub src_chain: String,
    /// Destination chain, as named by this protocol
    pub dst_chain: String,
    pub dst_addr: String,
    /// Base64-encoded payload
    pub payload: String,
    /// Decimal string
    pub fee: String,
}

/// Response data of `POST /messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayMessageResponse {
    pub delivery_id: String,
}

// ============================================================================
// ADAPTER
// ============================================================================

/// Bridge adapter backed by an HTTP relay (blocking reqwest client).
pub struct HttpRelayAdapter {
    base_url: String,
    source_chain: ChainId,
    names: ChainNameTable,
    client: reqwest::blocking::Client,
}

impl HttpRelayAdapter {
    /// Creates an adapter for the relay at `base_url`.
    ///
    /// The source chain must be named by `names`, since the relay needs the
    /// origin in its own naming scheme.
    pub fn new(
        base_url: impl Into<String>,
        source_chain: ChainId,
        names: ChainNameTable,
        timeout: Duration,
    ) -> Result<Self> {
        if !names.contains(source_chain) {
            anyhow::bail!(
                "Protocol '{}' has no name for source chain {}",
                names.protocol(),
                source_chain
            );
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            source_chain,
            names,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chain_name(&self, chain: ChainId) -> Result<&str, AdapterError> {
        self.names
            .name_for(chain)
            .ok_or(AdapterError::UnsupportedChain(chain))
    }

    fn fetch_fee(&self, chain_name: &str, payload_len: usize) -> Result<ApiResponse<FeeQuoteResponse>> {
        let url = format!("{}/fee/{}", self.base_url, chain_name);
        self.client
            .get(&url)
            .query(&[("payload_len", payload_len)])
            .send()
            .context("Failed to send GET /fee request")?
            .json()
            .context("Failed to parse GET /fee response")
    }

    fn post_message(&self, request: &RelayMessageRequest) -> Result<ApiResponse<RelayMessageResponse>> {
        let url = format!("{}/messages", self.base_url);
        self.client
            .post(&url)
            .json(request)
            .send()
            .context("Failed to send POST /messages request")?
            .json()
            .context("Failed to parse POST /messages response")
    }
}

impl BridgeAdapter for HttpRelayAdapter {
    fn protocol_name(&self) -> &str {
        self.names.protocol()
    }

    fn supported_chains(&self) -> Vec<ChainId> {
        self.names.chains()
    }

    fn supports(&self, chain: ChainId) -> bool {
        self.names.contains(chain)
    }

    fn estimate_fee(&self, dest_chain: ChainId, payload: &[u8]) -> Result<Amount, AdapterError> {
        let chain_name = self.chain_name(dest_chain)?;
        let response = self
            .fetch_fee(chain_name, payload.len())
            .map_err(|e| AdapterError::Transport(format!("{:#}", e)))?;

        if !response.success {
            return Err(AdapterError::Rejected(
                response.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }
        let quote = response
            .data
            .ok_or_else(|| AdapterError::Transport("Missing data in successful response".to_string()))?;
        quote
            .fee
            .parse::<Amount>()
            .map_err(|_| AdapterError::Transport(format!("Invalid fee '{}' in relay response", quote.fee)))
    }

    fn send(
        &self,
        dest_chain: ChainId,
        dest_addr: &str,
        payload: &[u8],
        fee: Amount,
    ) -> Result<DeliveryId, AdapterError> {
        let request = RelayMessageRequest {
            src_chain: self.chain_name(self.source_chain)?.to_string(),
            dst_chain: self.chain_name(dest_chain)?.to_string(),
            dst_addr: dest_addr.to_string(),
            payload: STANDARD.encode(payload),
            fee: fee.to_string(),
        };

        let response = self
            .post_message(&request)
            .map_err(|e| AdapterError::Transport(format!("{:#}", e)))?;

        if !response.success {
            return Err(AdapterError::Rejected(
                response.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }
        let data = response
            .data
            .ok_or_else(|| AdapterError::Transport("Missing data in successful response".to_string()))?;

        debug!(
            "Relay {} accepted message to {} as {}",
            self.base_url, request.dst_chain, data.delivery_id
        );
        Ok(data.delivery_id)
    }
}
