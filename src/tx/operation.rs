//! Operations submitted by a run and the preflight checks attached to them

use crate::chain::contracts::bindings::{fee_manager, permit, token};

use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes, U256};
use serde::Serialize;

/// A named token contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRef {
    pub name: String,
    pub address: Address,
}

impl TokenRef {
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

/// Role of the non-sender party of a token operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterpartyRole {
    Recipient,
    Spender,
}

impl std::fmt::Display for CounterpartyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterpartyRole::Recipient => write!(f, "recipient"),
            CounterpartyRole::Spender => write!(f, "spender"),
        }
    }
}

/// The call an operation makes
#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    /// Select the token the wallet pays network fees in
    FeePreference { fee_manager: Address, token: TokenRef },
    Transfer {
        token: TokenRef,
        recipient: Address,
        amount: U256,
    },
    Approve {
        token: TokenRef,
        spender: Address,
        amount: U256,
    },
    /// Permit-style allowance granted through a registry contract
    RegistryApprove {
        registry: Address,
        token: TokenRef,
        spender: Address,
        amount: U256,
        expiration: u64,
    },
}

impl OperationKind {
    /// Contract the transaction is sent to
    pub fn target(&self) -> Address {
        match self {
            OperationKind::FeePreference { fee_manager, .. } => *fee_manager,
            OperationKind::Transfer { token, .. } | OperationKind::Approve { token, .. } => {
                token.address
            }
            OperationKind::RegistryApprove { registry, .. } => *registry,
        }
    }

    /// ABI-encoded call data
    pub fn encode(&self) -> Bytes {
        let data = match self {
            OperationKind::FeePreference { token, .. } => fee_manager::SetUserTokenCall {
                token: token.address,
            }
            .encode(),
            OperationKind::Transfer {
                recipient, amount, ..
            } => token::TransferCall {
                to: *recipient,
                amount: *amount,
            }
            .encode(),
            OperationKind::Approve {
                spender, amount, ..
            } => token::ApproveCall {
                spender: *spender,
                amount: *amount,
            }
            .encode(),
            OperationKind::RegistryApprove {
                token,
                spender,
                amount,
                expiration,
                ..
            } => permit::ApproveCall {
                token: token.address,
                spender: *spender,
                amount: *amount,
                expiration: *expiration,
            }
            .encode(),
        };
        Bytes::from(data)
    }

    /// Token the operation moves or grants, with the party on the other side
    pub fn counterparty(&self) -> Option<(&TokenRef, Address, CounterpartyRole)> {
        match self {
            OperationKind::Transfer {
                token, recipient, ..
            } => Some((token, *recipient, CounterpartyRole::Recipient)),
            OperationKind::Approve { token, spender, .. }
            | OperationKind::RegistryApprove { token, spender, .. } => {
                Some((token, *spender, CounterpartyRole::Spender))
            }
            OperationKind::FeePreference { .. } => None,
        }
    }

    /// Amount moved or granted, if any
    pub fn amount(&self) -> Option<U256> {
        match self {
            OperationKind::Transfer { amount, .. }
            | OperationKind::Approve { amount, .. }
            | OperationKind::RegistryApprove { amount, .. } => Some(*amount),
            OperationKind::FeePreference { .. } => None,
        }
    }
}

/// A check the preflight validator runs before submission
#[derive(Debug, Clone, PartialEq)]
pub enum PreflightCheck {
    /// Pause flag, currency, decimals and transfer policy of `token`
    TokenState {
        token: TokenRef,
        counterparty: Address,
        role: CounterpartyRole,
    },
    TransferBalance {
        token: TokenRef,
        recipient: Address,
        amount: U256,
    },
    /// Record the sender's balance without asserting on it
    BalanceSnapshot { token: TokenRef },
    FeeBudget,
}

/// One transaction of a run, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: String,
    pub kind: OperationKind,
    pub checks: Vec<PreflightCheck>,
}

impl Operation {
    pub fn fee_preference(fee_manager: Address, token: TokenRef) -> Self {
        Self {
            name: format!("feePreference:setUserToken({})", token.name),
            kind: OperationKind::FeePreference { fee_manager, token },
            checks: vec![PreflightCheck::FeeBudget],
        }
    }

    pub fn transfer(token: TokenRef, recipient: Address, amount: U256) -> Self {
        Self {
            name: format!("transfer:{}", token.name),
            checks: vec![
                PreflightCheck::TokenState {
                    token: token.clone(),
                    counterparty: recipient,
                    role: CounterpartyRole::Recipient,
                },
                PreflightCheck::TransferBalance {
                    token: token.clone(),
                    recipient,
                    amount,
                },
                PreflightCheck::FeeBudget,
            ],
            kind: OperationKind::Transfer {
                token,
                recipient,
                amount,
            },
        }
    }

    pub fn approve(token: TokenRef, spender: Address, spender_name: &str, amount: U256) -> Self {
        let amount_label = if amount == U256::MAX {
            "MaxUint256".to_string()
        } else {
            amount.to_string()
        };
        Self {
            name: format!("approve:{}->{}({})", token.name, spender_name, amount_label),
            checks: vec![
                PreflightCheck::TokenState {
                    token: token.clone(),
                    counterparty: spender,
                    role: CounterpartyRole::Spender,
                },
                PreflightCheck::BalanceSnapshot {
                    token: token.clone(),
                },
                PreflightCheck::FeeBudget,
            ],
            kind: OperationKind::Approve {
                token,
                spender,
                amount,
            },
        }
    }

    pub fn registry_approve(
        registry: Address,
        registry_name: &str,
        token: TokenRef,
        spender: Address,
        amount: U256,
        expiration: u64,
    ) -> Self {
        Self {
            name: format!(
                "registryApprove:{}.approve({},SINK,{},{})",
                registry_name,
                token.name,
                if amount == max_uint160() {
                    "MaxUint160".to_string()
                } else {
                    amount.to_string()
                },
                if expiration == MAX_UINT48 {
                    "MaxUint48".to_string()
                } else {
                    expiration.to_string()
                }
            ),
            checks: vec![PreflightCheck::FeeBudget],
            kind: OperationKind::RegistryApprove {
                registry,
                token,
                spender,
                amount,
                expiration,
            },
        }
    }
}

/// Largest `uint48`, the permit expiration meaning "never"
pub const MAX_UINT48: u64 = (1u64 << 48) - 1;

/// Largest `uint160`, the permit amount meaning "unlimited"
pub fn max_uint160() -> U256 {
    (U256::one() << 160) - U256::one()
}
