//! Building transaction reports from raw receipts

use super::TxReport;
use crate::chain::RawReceipt;
use crate::error::{RunError, RunResult};

use ethers::types::U256;

impl TxReport {
    /// Verify the chain-specific receipt fields and convert quantities to decimal
    pub fn from_raw_receipt(
        name: &str,
        hash: &str,
        explorer: &str,
        receipt_raw: RawReceipt,
    ) -> RunResult<Self> {
        let gas_used = quantity_to_decimal(&receipt_raw, "gasUsed", name, hash)?;
        let effective_gas_price =
            quantity_to_decimal(&receipt_raw, "effectiveGasPrice", name, hash)?;
        let fee_token = required_string(&receipt_raw, "feeToken", name, hash)?;
        let fee_payer = required_string(&receipt_raw, "feePayer", name, hash)?;

        Ok(Self {
            name: name.to_string(),
            hash: hash.to_string(),
            explorer: explorer.to_string(),
            gas_used,
            effective_gas_price,
            fee_token,
            fee_payer,
            receipt_raw,
        })
    }
}

fn required_string(raw: &RawReceipt, key: &str, name: &str, hash: &str) -> RunResult<String> {
    match raw.get(key).and_then(|v| v.as_str()) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(RunError::ReceiptSchema {
            name: name.to_string(),
            message: format!(
                "{} receipt missing required field: {} tx={}",
                name, key, hash
            ),
        }),
    }
}

fn quantity_to_decimal(raw: &RawReceipt, key: &str, name: &str, hash: &str) -> RunResult<String> {
    let value = required_string(raw, key, name, hash)?;
    parse_quantity(&value)
        .map(|q| q.to_string())
        .ok_or_else(|| RunError::ReceiptSchema {
            name: name.to_string(),
            message: format!(
                "{} receipt field {} is not a valid quantity: {} tx={}",
                name, key, value, hash
            ),
        })
}

/// Parse a `0x`-prefixed hex quantity, or a plain decimal string
fn parse_quantity(value: &str) -> Option<U256> {
    let (digits, radix) = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (value, 10),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    U256::from_str_radix(digits, radix).ok()
}
