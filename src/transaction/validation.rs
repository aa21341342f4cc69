/// Validation and normalization of transaction params, separated from the
/// type definitions
use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::transaction::types::{Status, TxParams};

/// Status tags installed when no custom list is configured
pub static DEFAULT_STATUSES: &[&str] = &[
    Status::UNAPPROVED,
    Status::APPROVED,
    Status::SIGNED,
    Status::SUBMITTED,
    Status::CONFIRMED,
    Status::DROPPED,
];

/// Statuses that end a record's lifecycle. Records in one of these states
/// are the only ones the history-limit eviction may reclaim.
pub static FINAL_STATES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        Status::REJECTED,
        Status::CONFIRMED,
        Status::FAILED,
        Status::DROPPED,
    ]
    .into_iter()
    .collect()
});

pub fn is_hex_prefixed(value: &str) -> bool {
    value.starts_with("0x")
}

pub fn add_hex_prefix(value: &str) -> String {
    if is_hex_prefixed(value) {
        value.to_string()
    } else {
        format!("0x{}", value)
    }
}

/// A syntactically valid address: `0x` followed by 20 hex-encoded bytes
pub fn is_valid_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(body) => body.len() == 40 && hex::decode(body).is_ok(),
        None => false,
    }
}

fn is_valid_chain_id(value: &str) -> bool {
    let trimmed = value.trim();
    match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(body) => !body.is_empty() && u128::from_str_radix(body, 16).is_ok(),
        None => trimmed.parse::<i128>().is_ok(),
    }
}

fn validate_hex_field(field: &str, value: &str) -> Result<()> {
    if !is_hex_prefixed(value) {
        return Err(StoreError::InvalidTxParams {
            field: field.to_string(),
            reason: format!("not hex prefixed, got: {}", value),
        });
    }
    Ok(())
}

/// Validate params before they are committed to the store.
///
/// Checks every present field: `chainId` must parse as an integer (decimal
/// or `0x`-hex), everything else must be a hex-prefixed string, `from` must
/// be a valid address, and `value` must be a whole non-negative quantity.
/// A `to` of exactly `"0x"` or an explicit null marks contract creation:
/// it requires `data` and is then removed from the params, which is why
/// this takes `&mut`.
pub fn validate_tx_params(params: &mut TxParams) -> Result<()> {
    let named = [
        ("from", &params.from),
        ("value", &params.value),
        ("data", &params.data),
        ("gas", &params.gas),
        ("gasPrice", &params.gas_price),
        ("nonce", &params.nonce),
    ];
    for (key, value) in named {
        if let Some(value) = value {
            validate_hex_field(key, value)?;
        }
    }
    if let Some(Some(to)) = &params.to {
        validate_hex_field("to", to)?;
    }
    if let Some(chain_id) = &params.chain_id {
        if !is_valid_chain_id(chain_id) {
            return Err(StoreError::InvalidTxParams {
                field: "chainId".to_string(),
                reason: format!("not a number or hex string, got: {}", chain_id),
            });
        }
    }
    for (key, value) in &params.extra {
        // a dot in the key would collide with history diff paths
        if key.contains('.') {
            return Err(StoreError::InvalidTxParams {
                field: key.clone(),
                reason: "field names must not contain '.'".to_string(),
            });
        }
        match value {
            Value::String(text) => validate_hex_field(key, text)?,
            other => {
                return Err(StoreError::InvalidTxParams {
                    field: key.clone(),
                    reason: format!("not a string, got: {}", other),
                })
            }
        }
    }

    validate_from(params)?;
    validate_recipient(params)?;

    if let Some(value) = &params.value {
        if value.contains('-') {
            return Err(StoreError::InvalidTxParams {
                field: "value".to_string(),
                reason: format!("{} is not a positive number", value),
            });
        }
        if value.contains('.') {
            return Err(StoreError::InvalidTxParams {
                field: "value".to_string(),
                reason: format!("{} must be a whole quantity in base units", value),
            });
        }
    }

    Ok(())
}

pub fn validate_from(params: &TxParams) -> Result<()> {
    let from = params
        .from
        .as_deref()
        .ok_or_else(|| StoreError::InvalidTxParams {
            field: "from".to_string(),
            reason: "missing".to_string(),
        })?;
    if !is_valid_address(from) {
        return Err(StoreError::InvalidTxParams {
            field: "from".to_string(),
            reason: format!("{} is not a valid address", from),
        });
    }
    Ok(())
}

pub fn validate_recipient(params: &mut TxParams) -> Result<()> {
    let to = params.to.as_ref().map(|inner| inner.as_deref());
    match to {
        // the bare prefix and an explicit null both mark contract creation
        Some(Some("0x")) | Some(None) => {
            let has_data = params.data.as_deref().map_or(false, |d| !d.is_empty());
            if has_data {
                // contract creation: the placeholder recipient goes away
                params.to = None;
            } else {
                return Err(StoreError::InvalidTxParams {
                    field: "to".to_string(),
                    reason: "not a valid address".to_string(),
                });
            }
        }
        Some(Some(to)) => {
            if !is_valid_address(to) {
                return Err(StoreError::InvalidTxParams {
                    field: "to".to_string(),
                    reason: format!("{} is not a valid address", to),
                });
            }
        }
        None => {}
    }
    Ok(())
}

/// Build a clean copy of `params` holding only the known transfer fields,
/// hex-prefixed, with addresses lowercased. `chainId` and extra keys are
/// dropped on purpose.
pub fn normalize_tx_params(params: &TxParams) -> TxParams {
    let normalize_address =
        |field: &Option<String>| -> Option<String> {
            field
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| add_hex_prefix(v).to_lowercase())
        };
    let normalize_quantity = |field: &Option<String>| -> Option<String> {
        field
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(add_hex_prefix)
    };

    let mut normalized = TxParams::new();
    normalized.from = normalize_address(&params.from);
    normalized.to = match params.to.as_ref() {
        Some(Some(to)) if !to.is_empty() => Some(Some(add_hex_prefix(to).to_lowercase())),
        // an explicit null keeps marking contract creation downstream
        Some(None) => Some(None),
        _ => None,
    };
    normalized.nonce = normalize_quantity(&params.nonce);
    normalized.value = normalize_quantity(&params.value);
    normalized.data = normalize_quantity(&params.data);
    normalized.gas = normalize_quantity(&params.gas);
    normalized.gas_price = normalize_quantity(&params.gas_price);
    normalized
}
