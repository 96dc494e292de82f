//! Preflight assertions run immediately before a transaction is submitted
//!
//! Every check appends what it observed to the run's preflight record before
//! deciding, so a failure report always shows the values that triggered it.

use super::context::RunContext;
use super::gas::FeeEstimator;
use super::operation::{CounterpartyRole, Operation, PreflightCheck, TokenRef};
use crate::chain::{FeeFields, TokenContracts};
use crate::error::{PreflightViolation, RunResult};

use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// What a single check observed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "check")]
pub enum PreflightDetail {
    #[serde(rename = "tokenPolicy", rename_all = "camelCase")]
    TokenPolicy {
        token_name: String,
        token_address: String,
        paused: bool,
        currency: String,
        decimals: u8,
        policy_id: String,
        sender: String,
        sender_authorized: bool,
        counterparty_role: CounterpartyRole,
        counterparty_address: String,
        counterparty_authorized: bool,
    },
    #[serde(rename = "transferBalance", rename_all = "camelCase")]
    TransferBalance {
        token_name: String,
        token_address: String,
        wallet: String,
        recipient: String,
        balance: String,
        required: String,
    },
    #[serde(rename = "approveBalanceSnapshot", rename_all = "camelCase")]
    BalanceSnapshot {
        token_name: String,
        token_address: String,
        wallet: String,
        balance: String,
    },
    #[serde(rename = "feeBudget", rename_all = "camelCase")]
    FeeBudget {
        tx_name: String,
        fee_token: String,
        wallet: String,
        fee_balance: String,
        gas_limit: String,
        gas_price: String,
        max_fee_atto: String,
        required_micro: String,
    },
}

/// One line of the preflight log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreflightEntry {
    pub step: String,
    #[serde(flatten)]
    pub detail: PreflightDetail,
}

/// Append-only ordered log of preflight observations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PreflightRecord {
    entries: Vec<PreflightEntry>,
}

impl PreflightRecord {
    pub fn append(&mut self, step: &str, detail: PreflightDetail) {
        self.entries.push(PreflightEntry {
            step: step.to_string(),
            detail,
        });
    }

    pub fn entries(&self) -> &[PreflightEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Runs token state, balance and fee-budget checks
pub struct PreflightValidator {
    contracts: Arc<dyn TokenContracts>,
    /// Token the network charges fees in
    fee_token: TokenRef,
    expected_currency: String,
    expected_decimals: u8,
}

impl PreflightValidator {
    pub fn new(
        contracts: Arc<dyn TokenContracts>,
        fee_token: TokenRef,
        expected_currency: impl Into<String>,
        expected_decimals: u8,
    ) -> Self {
        Self {
            contracts,
            fee_token,
            expected_currency: expected_currency.into(),
            expected_decimals,
        }
    }

    /// Run every check attached to `operation`, in order.
    ///
    /// `gas_limit` must be the limit estimated for this exact call. Returns the
    /// sender's token balance when a balance check observed one.
    pub async fn run(
        &self,
        ctx: &mut RunContext,
        operation: &Operation,
        sender: Address,
        gas_limit: U256,
        fees: &FeeFields,
    ) -> RunResult<Option<U256>> {
        let mut observed_balance = None;

        for check in &operation.checks {
            match check {
                PreflightCheck::TokenState {
                    token,
                    counterparty,
                    role,
                } => {
                    self.check_token_state(ctx, token, sender, *counterparty, *role)
                        .await?;
                }
                PreflightCheck::TransferBalance {
                    token,
                    recipient,
                    amount,
                } => {
                    let balance = self
                        .check_transfer_balance(ctx, token, sender, *recipient, *amount)
                        .await?;
                    observed_balance = Some(balance);
                }
                PreflightCheck::BalanceSnapshot { token } => {
                    let balance = self.snapshot_balance(ctx, token, sender).await?;
                    observed_balance = Some(balance);
                }
                PreflightCheck::FeeBudget => {
                    self.check_fee_budget(ctx, &operation.name, sender, gas_limit, fees)
                        .await?;
                }
            }
        }

        Ok(observed_balance)
    }

    /// Pause flag, currency, decimals, and transfer-policy authorization of both parties
    pub async fn check_token_state(
        &self,
        ctx: &mut RunContext,
        token: &TokenRef,
        sender: Address,
        counterparty: Address,
        role: CounterpartyRole,
    ) -> RunResult<()> {
        let paused = self.contracts.paused(token.address).await?;
        let currency = self.contracts.currency(token.address).await?;
        let decimals = self.contracts.decimals(token.address).await?;
        let policy_id = self.contracts.transfer_policy_id(token.address).await?;
        let sender_authorized = self.contracts.is_authorized(policy_id, sender).await?;
        let counterparty_authorized = self
            .contracts
            .is_authorized(policy_id, counterparty)
            .await?;

        ctx.record(PreflightDetail::TokenPolicy {
            token_name: token.name.clone(),
            token_address: to_checksum(&token.address, None),
            paused,
            currency: currency.clone(),
            decimals,
            policy_id: policy_id.to_string(),
            sender: to_checksum(&sender, None),
            sender_authorized,
            counterparty_role: role,
            counterparty_address: to_checksum(&counterparty, None),
            counterparty_authorized,
        });

        if paused {
            return Err(PreflightViolation::TokenPaused {
                token: token.name.clone(),
                address: token.address,
            }
            .into());
        }
        if currency != self.expected_currency {
            return Err(PreflightViolation::CurrencyMismatch {
                token: token.name.clone(),
                address: token.address,
                expected: self.expected_currency.clone(),
                actual: currency,
            }
            .into());
        }
        if decimals != self.expected_decimals {
            return Err(PreflightViolation::DecimalsMismatch {
                token: token.name.clone(),
                address: token.address,
                expected: self.expected_decimals,
                actual: decimals,
            }
            .into());
        }
        if !sender_authorized {
            return Err(PreflightViolation::SenderUnauthorized {
                token: token.name.clone(),
                address: token.address,
                policy_id,
                sender,
            }
            .into());
        }
        if !counterparty_authorized {
            return Err(PreflightViolation::CounterpartyUnauthorized {
                token: token.name.clone(),
                address: token.address,
                policy_id,
                role,
                counterparty,
            }
            .into());
        }

        Ok(())
    }

    /// Sender balance must cover `amount`; equality passes
    pub async fn check_transfer_balance(
        &self,
        ctx: &mut RunContext,
        token: &TokenRef,
        sender: Address,
        recipient: Address,
        amount: U256,
    ) -> RunResult<U256> {
        let balance = self.contracts.balance_of(token.address, sender).await?;

        info!(
            "[balance] token={} tokenAddress={:?} wallet={:?} recipient={:?} balance={} transferAmount={}",
            token.name, token.address, sender, recipient, balance, amount
        );

        ctx.record(PreflightDetail::TransferBalance {
            token_name: token.name.clone(),
            token_address: to_checksum(&token.address, None),
            wallet: to_checksum(&sender, None),
            recipient: to_checksum(&recipient, None),
            balance: balance.to_string(),
            required: amount.to_string(),
        });

        if balance < amount {
            return Err(PreflightViolation::InsufficientBalance {
                token: token.name.clone(),
                address: token.address,
                wallet: sender,
                role: CounterpartyRole::Recipient,
                counterparty: recipient,
                balance,
                required: amount,
            }
            .into());
        }

        Ok(balance)
    }

    pub async fn snapshot_balance(
        &self,
        ctx: &mut RunContext,
        token: &TokenRef,
        sender: Address,
    ) -> RunResult<U256> {
        let balance = self.contracts.balance_of(token.address, sender).await?;

        ctx.record(PreflightDetail::BalanceSnapshot {
            token_name: token.name.clone(),
            token_address: to_checksum(&token.address, None),
            wallet: to_checksum(&sender, None),
            balance: balance.to_string(),
        });

        Ok(balance)
    }

    /// Fee-token balance must cover ceil(gasLimit * gasPrice / 10^12)
    pub async fn check_fee_budget(
        &self,
        ctx: &mut RunContext,
        tx_name: &str,
        sender: Address,
        gas_limit: U256,
        fees: &FeeFields,
    ) -> RunResult<()> {
        let gas_price = fees.representative_gas_price();
        let (max_fee_atto, required_micro) = FeeEstimator::required_fee_micro(gas_limit, fees)?;
        let fee_balance = self
            .contracts
            .balance_of(self.fee_token.address, sender)
            .await?;

        info!(
            "[fee-precheck] tx={} feeToken={} wallet={:?} feeBalance={} gasLimit={} gasPrice={} maxFeeAtto={} requiredMicro={}",
            tx_name, self.fee_token.name, sender, fee_balance, gas_limit, gas_price, max_fee_atto, required_micro
        );

        ctx.record(PreflightDetail::FeeBudget {
            tx_name: tx_name.to_string(),
            fee_token: to_checksum(&self.fee_token.address, None),
            wallet: to_checksum(&sender, None),
            fee_balance: fee_balance.to_string(),
            gas_limit: gas_limit.to_string(),
            gas_price: gas_price.to_string(),
            max_fee_atto: max_fee_atto.to_string(),
            required_micro: required_micro.to_string(),
        });

        if fee_balance < required_micro {
            warn!("{} fee budget short by {}", tx_name, required_micro - fee_balance);
            return Err(PreflightViolation::InsufficientFeeBudget {
                tx_name: tx_name.to_string(),
                fee_token: self.fee_token.name.clone(),
                fee_token_address: self.fee_token.address,
                wallet: sender,
                balance: fee_balance,
                required: required_micro,
                gas_limit,
                gas_price,
            }
            .into());
        }

        Ok(())
    }
}
