//! Contract bindings and typed token/policy reads

use super::TokenContracts;
use crate::error::ChainError;

use async_trait::async_trait;
use ethers::prelude::*;
use std::sync::Arc;

/// Generated bindings, one module per contract so call types stay unambiguous
pub mod bindings {
    pub mod token {
        ethers::contract::abigen!(
            Tip20Token,
            r#"[
                function balanceOf(address account) external view returns (uint256)
                function transfer(address to, uint256 amount) external returns (bool)
                function approve(address spender, uint256 amount) external returns (bool)
                function paused() external view returns (bool)
                function currency() external view returns (string)
                function decimals() external view returns (uint8)
                function transferPolicyId() external view returns (uint64)
            ]"#
        );
    }

    pub mod policy {
        ethers::contract::abigen!(
            PolicyRegistry,
            r#"[
                function isAuthorized(uint64 policyId, address user) external view returns (bool)
            ]"#
        );
    }

    pub mod fee_manager {
        ethers::contract::abigen!(
            FeeManager,
            r#"[
                function setUserToken(address token) external
            ]"#
        );
    }

    pub mod permit {
        ethers::contract::abigen!(
            PermitRegistry,
            r#"[
                function approve(address token, address spender, uint160 amount, uint48 expiration) external
            ]"#
        );
    }
}

use bindings::policy::PolicyRegistry;
use bindings::token::Tip20Token;

/// Token and policy reads over the shared HTTP provider
pub struct EthersTokenContracts {
    provider: Arc<Provider<Http>>,
    policy_registry: Address,
}

impl EthersTokenContracts {
    pub fn new(provider: Provider<Http>, policy_registry: Address) -> Self {
        Self {
            provider: Arc::new(provider),
            policy_registry,
        }
    }

    fn token(&self, address: Address) -> Tip20Token<Provider<Http>> {
        Tip20Token::new(address, self.provider.clone())
    }
}

fn contract_error(call: &str, target: Address, e: impl std::fmt::Display) -> ChainError {
    ChainError::Contract(format!("{} on {:?}: {}", call, target, e))
}

#[async_trait]
impl TokenContracts for EthersTokenContracts {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        self.token(token)
            .balance_of(owner)
            .call()
            .await
            .map_err(|e| contract_error("balanceOf", token, e))
    }

    async fn paused(&self, token: Address) -> Result<bool, ChainError> {
        self.token(token)
            .paused()
            .call()
            .await
            .map_err(|e| contract_error("paused", token, e))
    }

    async fn currency(&self, token: Address) -> Result<String, ChainError> {
        self.token(token)
            .currency()
            .call()
            .await
            .map_err(|e| contract_error("currency", token, e))
    }

    async fn decimals(&self, token: Address) -> Result<u8, ChainError> {
        self.token(token)
            .decimals()
            .call()
            .await
            .map_err(|e| contract_error("decimals", token, e))
    }

    async fn transfer_policy_id(&self, token: Address) -> Result<u64, ChainError> {
        self.token(token)
            .transfer_policy_id()
            .call()
            .await
            .map_err(|e| contract_error("transferPolicyId", token, e))
    }

    async fn is_authorized(&self, policy_id: u64, account: Address) -> Result<bool, ChainError> {
        PolicyRegistry::new(self.policy_registry, self.provider.clone())
            .is_authorized(policy_id, account)
            .call()
            .await
            .map_err(|e| contract_error("isAuthorized", self.policy_registry, e))
    }
}
