//! Error types for the daily transaction runner

use crate::tx::{CounterpartyRole, Stage};

use ethers::types::{Address, U256};
use thiserror::Error;

/// Errors raised by the ledger, signer and contract collaborators
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract call error: {0}")]
    Contract(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },
}

/// A locally detected reason not to submit a transaction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreflightViolation {
    #[error("{token} is paused. token={address:?}")]
    TokenPaused { token: String, address: Address },

    #[error("{token} currency mismatch. token={address:?} expected={expected} actual={actual}")]
    CurrencyMismatch {
        token: String,
        address: Address,
        expected: String,
        actual: String,
    },

    #[error("{token}.decimals mismatch: token={address:?} expected={expected} actual={actual}")]
    DecimalsMismatch {
        token: String,
        address: Address,
        expected: u8,
        actual: u8,
    },

    #[error("{token} transfer policy: sender unauthorized. token={address:?} policyId={policy_id} sender={sender:?}")]
    SenderUnauthorized {
        token: String,
        address: Address,
        policy_id: u64,
        sender: Address,
    },

    #[error("{token} transfer policy: {role} unauthorized. token={address:?} policyId={policy_id} {role}={counterparty:?}")]
    CounterpartyUnauthorized {
        token: String,
        address: Address,
        policy_id: u64,
        role: CounterpartyRole,
        counterparty: Address,
    },

    #[error("{token} balance insufficient. wallet={wallet:?} token={address:?} {role}={counterparty:?} balance={balance} required={required}")]
    InsufficientBalance {
        token: String,
        address: Address,
        wallet: Address,
        role: CounterpartyRole,
        counterparty: Address,
        balance: U256,
        required: U256,
    },

    #[error("{tx_name} fee balance insufficient. wallet={wallet:?} feeToken={fee_token} feeTokenAddress={fee_token_address:?} feeBalance={balance} requiredMicro={required} gasLimit={gas_limit} gasPrice={gas_price}")]
    InsufficientFeeBudget {
        tx_name: String,
        fee_token: String,
        fee_token_address: Address,
        wallet: Address,
        balance: U256,
        required: U256,
        gas_limit: U256,
        gas_price: U256,
    },
}

/// Errors raised while writing a report document
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Main error type for a run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("chainId mismatch: expected={expected} actual={actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Preflight failed: {0}")]
    Preflight(#[from] PreflightViolation),

    #[error("fee data returned no usable fee fields")]
    NoUsableFeeFields,

    #[error("{step} failed. {context} cause={source}")]
    Estimation {
        step: String,
        context: String,
        source: ChainError,
    },

    #[error("{step} failed. {context} cause={source}")]
    Submission {
        step: String,
        context: String,
        source: ChainError,
    },

    #[error("{step} failed. {context} cause={reason}")]
    Confirmation {
        step: String,
        context: String,
        reason: String,
    },

    #[error("{message}")]
    ReceiptSchema { name: String, message: String },

    #[error("nonce mismatch for tx {hash}: assigned={assigned} reported={reported}")]
    NonceMismatch {
        assigned: u64,
        reported: u64,
        hash: String,
    },

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RunError {
    /// Pipeline stage that raised the error, if it was stage-tagged
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RunError::Estimation { .. } => Some(Stage::EstimateGas),
            RunError::Submission { .. } => Some(Stage::Send),
            RunError::Confirmation { .. } => Some(Stage::WaitAndVerify),
            _ => None,
        }
    }

    /// Render the chain of underlying causes, outermost first
    pub fn cause_chain(&self) -> Option<String> {
        let mut causes = Vec::new();
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            causes.push(format!("caused by: {}", cause));
            current = cause.source();
        }

        if causes.is_empty() {
            None
        } else {
            Some(causes.join("\n"))
        }
    }
}

/// Result type for run operations
pub type RunResult<T> = Result<T, RunError>;
