//! Identifier generation

use crate::error::MarketError;
use bech32::Bech32m;
use uuid7::uuid7;

/// Human readable prefix of every order id.
pub const ORDER_HRP: &str = "order_";

/// A uuid7 (time ordered) encoded as bech32m under the given prefix.
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encoded = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encoded)
}

pub fn new_order_id() -> Result<String, MarketError> {
    new_uuid_to_bech32(ORDER_HRP).map_err(|e| MarketError::codec(format!("order id: {e}")))
}

/// Composite key for child records: `parent 0x00 child`. Ids and product
/// names never contain a NUL byte, so a parent prefix scan is exact.
pub fn child_key(parent: &str, child: &str) -> Vec<u8> {
    let mut key = parent_prefix(parent);
    key.extend_from_slice(child.as_bytes());
    key
}

pub fn parent_prefix(parent: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(parent.len() + 1);
    key.extend_from_slice(parent.as_bytes());
    key.push(0);
    key
}
