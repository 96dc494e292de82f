//! Fee field selection and fee-budget arithmetic

use crate::chain::{FeeData, FeeFields, GasPrice, LedgerEndpoint};
use crate::error::{RunError, RunResult};

use ethers::types::U256;
use tracing::debug;

/// Fee tokens are 6-decimal stablecoins while gas is priced in 18-decimal units
pub const ATTO_PER_MICRO: u64 = 1_000_000_000_000;

/// Picks fee fields from the live fee data
pub struct FeeEstimator;

impl FeeEstimator {
    /// Select modern fields when both max and priority fee are known, else the
    /// legacy gas price
    pub fn select(fee_data: &FeeData, nonce: u64) -> RunResult<FeeFields> {
        let pricing = match (
            fee_data.max_fee_per_gas,
            fee_data.max_priority_fee_per_gas,
            fee_data.gas_price,
        ) {
            (Some(max_fee_per_gas), Some(max_priority_fee_per_gas), _) => GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            },
            (_, _, Some(price)) => GasPrice::Legacy(price),
            _ => return Err(RunError::NoUsableFeeFields),
        };

        Ok(FeeFields { nonce, pricing })
    }

    /// Query the ledger and select fee fields for `nonce`
    pub async fn fee_fields(ledger: &dyn LedgerEndpoint, nonce: u64) -> RunResult<FeeFields> {
        let fee_data = ledger.fee_data().await?;
        let fields = Self::select(&fee_data, nonce)?;
        debug!("Fee fields: {}", fields);
        Ok(fields)
    }

    /// Worst-case fee in the fee token's smallest unit, rounded up
    pub fn required_fee_micro(gas_limit: U256, fees: &FeeFields) -> RunResult<(U256, U256)> {
        let max_fee_atto = gas_limit
            .checked_mul(fees.representative_gas_price())
            .ok_or_else(|| {
                RunError::Internal(format!(
                    "fee overflow: gasLimit={} gasPrice={}",
                    gas_limit,
                    fees.representative_gas_price()
                ))
            })?;
        Ok((max_fee_atto, atto_to_micro_ceil(max_fee_atto)))
    }
}

/// Integer division rounding toward positive infinity; `None` for a zero denominator
pub fn ceil_div(numerator: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    let (quotient, remainder) = numerator.div_mod(denominator);
    if remainder.is_zero() {
        Some(quotient)
    } else {
        Some(quotient + U256::one())
    }
}

/// Convert an 18-decimal amount to 6-decimal units, never rounding down
pub fn atto_to_micro_ceil(atto: U256) -> U256 {
    ceil_div(atto, U256::from(ATTO_PER_MICRO)).unwrap_or_default()
}
