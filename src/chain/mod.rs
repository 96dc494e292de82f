//! Chain module - ledger, signer and contract collaborators
//!
//! The pipeline only talks to the chain through the traits defined here:
//! - `LedgerEndpoint`: network identity, nonce, fee data, gas estimation, receipts
//! - `TxSigner`: the wallet address and raw transaction submission
//! - `TokenContracts`: typed reads against token and policy contracts
//!
//! The ethers-backed implementations live in the submodules.

pub mod contracts;
pub mod provider;
pub mod signer;

pub use contracts::EthersTokenContracts;
pub use provider::EthersLedger;
pub use signer::WalletSigner;

use crate::error::ChainError;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
#[cfg(test)]
use mockall::automock;
use std::time::Duration;

/// Receipt as returned by `eth_getTransactionReceipt`, untouched
pub type RawReceipt = serde_json::Map<String, serde_json::Value>;

/// Snapshot of the network's fee data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeeData {
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub gas_price: Option<U256>,
}

/// Gas price types
#[derive(Debug, Clone, PartialEq)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

/// Fee overrides for one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct FeeFields {
    pub nonce: u64,
    pub pricing: GasPrice,
}

impl FeeFields {
    /// Price used for fee-budget arithmetic: the max fee, else the legacy gas price
    pub fn representative_gas_price(&self) -> U256 {
        match self.pricing {
            GasPrice::Legacy(price) => price,
            GasPrice::Eip1559 {
                max_fee_per_gas, ..
            } => max_fee_per_gas,
        }
    }
}

impl std::fmt::Display for FeeFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pricing {
            GasPrice::Legacy(price) => {
                write!(f, "{{nonce={}, gasPrice={}}}", self.nonce, price)
            }
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => write!(
                f,
                "{{nonce={}, type=2, maxFeePerGas={}, maxPriorityFeePerGas={}}}",
                self.nonce, max_fee_per_gas, max_priority_fee_per_gas
            ),
        }
    }
}

/// A fully specified call, minus the gas limit
#[derive(Debug, Clone, PartialEq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub fees: FeeFields,
}

/// Outcome of waiting for a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedReceipt {
    pub status: Option<u64>,
    pub block_number: Option<u64>,
}

impl ConfirmedReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == Some(1)
    }
}

/// Read and query surface of the network
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerEndpoint: Send + Sync {
    /// Chain id reported by the endpoint
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Transaction count of `address` including pending transactions
    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError>;

    async fn fee_data(&self) -> Result<FeeData, ChainError>;

    async fn estimate_gas(&self, request: &TxRequest) -> Result<U256, ChainError>;

    /// Wait until the transaction has `confirmations` blocks on top of it.
    ///
    /// Returns `Ok(None)` if the node dropped the transaction. Hitting `timeout`
    /// is an error; the transaction itself stays broadcast.
    async fn wait_for_receipt(
        &self,
        hash: H256,
        confirmations: usize,
        timeout: Duration,
    ) -> Result<Option<ConfirmedReceipt>, ChainError>;

    /// Receipt through a direct `eth_getTransactionReceipt` call, so chain-specific
    /// fields survive
    async fn raw_receipt(&self, hash: H256) -> Result<Option<RawReceipt>, ChainError>;

    /// Nonce of an accepted transaction as the network reports it
    async fn transaction_nonce(&self, hash: H256) -> Result<Option<u64>, ChainError>;
}

/// Wallet that signs and broadcasts transactions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TxSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign `request` with the given gas limit and broadcast it, returning the hash
    async fn send_transaction(
        &self,
        request: &TxRequest,
        gas_limit: U256,
    ) -> Result<H256, ChainError>;
}

/// Typed reads against token and transfer-policy contracts
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenContracts: Send + Sync {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError>;

    async fn paused(&self, token: Address) -> Result<bool, ChainError>;

    async fn currency(&self, token: Address) -> Result<String, ChainError>;

    async fn decimals(&self, token: Address) -> Result<u8, ChainError>;

    async fn transfer_policy_id(&self, token: Address) -> Result<u64, ChainError>;

    /// Whether `account` is authorized under `policy_id` on the policy registry
    async fn is_authorized(&self, policy_id: u64, account: Address) -> Result<bool, ChainError>;
}
