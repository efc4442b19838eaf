//! Shared primitive types and address helpers.

/// Token amounts in the asset's smallest unit.
pub type Amount = u128;

/// Basis-point denominator (100% = 10_000 bps).
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Normalizes a `0x`-prefixed hex address to lowercase.
///
/// Accepts 20-byte (EVM) and 32-byte (Move/SVM hex) addresses so vault and
/// user addresses from different chain families compare consistently.
///
/// # Returns
///
/// * `Ok(String)` - Lowercase `0x`-prefixed address
/// * `Err(anyhow::Error)` - Missing prefix, invalid hex or unexpected length
pub fn normalize_address(addr: &str) -> anyhow::Result<String> {
    let stripped = addr
        .strip_prefix("0x")
        .ok_or_else(|| anyhow::anyhow!("Address must be 0x-prefixed hex string, got '{}'", addr))?;
    let bytes = hex::decode(stripped).map_err(|_| anyhow::anyhow!("Invalid hex address '{}'", addr))?;
    if bytes.len() != 20 && bytes.len() != 32 {
        anyhow::bail!(
            "Invalid address length: expected 20 or 32 bytes, got {}",
            bytes.len()
        );
    }
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Current wall-clock time in unix milliseconds.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Applies a basis-point ratio to an amount, rounding down.
pub fn apply_bps(amount: Amount, bps: u128) -> Amount {
    amount.saturating_mul(bps) / BPS_DENOMINATOR
}
