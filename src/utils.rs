//! Shared helpers: header encoding, address and amount parsing, timestamps.
//!
//! Amount conversions are exact string/`U256` arithmetic. Floating point is
//! never used on a code path that compares money.

use crate::errors::{Result, X402Error};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ethers::types::{Address, U256};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::str::FromStr;

/// Encodes a value as base64(JSON) for transport in an HTTP header.
pub fn encode_header<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value)?;
    Ok(BASE64.encode(json.as_bytes()))
}

/// Decodes a base64(JSON) header value.
pub fn decode_header<T: DeserializeOwned>(encoded: &str) -> Result<T> {
    let decoded = BASE64.decode(encoded.as_bytes())?;
    let json_str = String::from_utf8(decoded).map_err(|e| X402Error::InvalidResponse {
        reason: format!("header is not UTF-8: {}", e),
    })?;
    Ok(serde_json::from_str(&json_str)?)
}

/// Decodes a base64 header into a raw JSON value without shape validation.
///
/// The payee uses this so it can report the exact missing field instead of a
/// generic deserialization error.
pub fn decode_header_value(encoded: &str) -> Result<serde_json::Value> {
    let decoded = BASE64.decode(encoded.as_bytes())?;
    let json_str = String::from_utf8(decoded).map_err(|e| X402Error::InvalidResponse {
        reason: format!("header is not UTF-8: {}", e),
    })?;
    Ok(serde_json::from_str(&json_str)?)
}

/// Validates and parses an EVM address (with or without `0x` prefix).
pub fn parse_address(addr: &str) -> Result<Address> {
    Address::from_str(addr).map_err(|e| X402Error::InvalidAddress {
        address: addr.to_string(),
        reason: e.to_string(),
    })
}

/// Parses a uint256 from a decimal or `0x`-hex string.
pub fn string_to_u256(s: &str) -> Result<U256> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return U256::from_str_radix(hex, 16).map_err(|e| X402Error::InvalidAmount {
            amount: s.to_string(),
            reason: e.to_string(),
        });
    }
    U256::from_dec_str(s).map_err(|e| X402Error::InvalidAmount {
        amount: s.to_string(),
        reason: e.to_string(),
    })
}

/// Converts a human-readable decimal amount (e.g. `"0.01"`) to atomic token
/// units at the given number of decimals.
///
/// Exact: rejects inputs with more fractional digits than the token carries
/// rather than rounding them away.
pub fn decimal_to_atomic(amount: &str, decimals: u8) -> Result<U256> {
    let invalid = |reason: &str| X402Error::InvalidAmount {
        amount: amount.to_string(),
        reason: reason.to_string(),
    };

    let amount = amount.trim();
    if amount.is_empty() || amount.starts_with('-') {
        return Err(invalid("must be a non-negative decimal"));
    }

    let (int_part, frac_part) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };

    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
        || (int_part.is_empty() && frac_part.is_empty())
    {
        return Err(invalid("must be a non-negative decimal"));
    }

    if frac_part.len() > decimals as usize {
        return Err(invalid("more fractional digits than the token supports"));
    }

    let scale = U256::from(10u64).pow(U256::from(decimals));
    let int_units = if int_part.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(int_part).map_err(|e| invalid(&e.to_string()))?
    };

    let frac_units = if frac_part.is_empty() {
        U256::zero()
    } else {
        let padding = decimals as usize - frac_part.len();
        let frac = U256::from_dec_str(frac_part).map_err(|e| invalid(&e.to_string()))?;
        frac * U256::from(10u64).pow(U256::from(padding))
    };

    int_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(|| invalid("overflows uint256"))
}

/// Renders atomic token units as a human-readable decimal string.
pub fn atomic_to_decimal(value: U256, decimals: u8) -> String {
    let scale = U256::from(10u64).pow(U256::from(decimals));
    let int_part = value / scale;
    let frac_part = value % scale;
    if frac_part.is_zero() {
        return int_part.to_string();
    }
    let frac = format!("{:0>width$}", frac_part, width = decimals as usize);
    format!("{}.{}", int_part, frac.trim_end_matches('0'))
}

/// Current Unix timestamp in seconds.
pub fn current_timestamp() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

/// Whether `now` falls inside the `[valid_after, valid_before]` window.
pub fn is_timestamp_valid(valid_after: u64, valid_before: u64) -> bool {
    let now = current_timestamp();
    now >= valid_after && now <= valid_before
}
