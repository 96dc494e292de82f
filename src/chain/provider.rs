//! Ethers-backed ledger endpoint over a single HTTP RPC

use super::{ConfirmedReceipt, FeeData, GasPrice, LedgerEndpoint, RawReceipt, TxRequest};
use crate::error::ChainError;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::time::Duration;
use tracing::{debug, warn};

/// Polling interval for pending transactions
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// JSON-RPC ledger endpoint
pub struct EthersLedger {
    /// HTTP provider
    provider: Provider<Http>,
    /// Priority fee added on top of twice the base fee
    priority_fee: U256,
}

impl EthersLedger {
    /// Create a new ledger endpoint
    pub fn new(rpc_url: &str, priority_fee: U256) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ChainError::Rpc(format!("Invalid RPC url {}: {}", rpc_url, e)))?
            .interval(RECEIPT_POLL_INTERVAL);

        debug!("Created HTTP provider for {}", rpc_url);
        Ok(Self {
            provider,
            priority_fee,
        })
    }

    /// Get the underlying HTTP provider
    pub fn provider(&self) -> &Provider<Http> {
        &self.provider
    }
}

#[async_trait]
impl LedgerEndpoint for EthersLedger {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(chain_id.as_u64())
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError> {
        let nonce = self
            .provider
            .get_transaction_count(address, Some(BlockId::Number(BlockNumber::Pending)))
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(nonce.as_u64())
    }

    async fn fee_data(&self) -> Result<FeeData, ChainError> {
        let gas_price = match self.provider.get_gas_price().await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("eth_gasPrice failed, continuing without legacy price: {}", e);
                None
            }
        };

        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        let (max_fee_per_gas, max_priority_fee_per_gas) =
            match block.and_then(|b| b.base_fee_per_gas) {
                Some(base_fee) => {
                    let max_fee = base_fee * 2 + self.priority_fee;
                    (Some(max_fee), Some(self.priority_fee))
                }
                None => (None, None),
            };

        Ok(FeeData {
            max_fee_per_gas,
            max_priority_fee_per_gas,
            gas_price,
        })
    }

    async fn estimate_gas(&self, request: &TxRequest) -> Result<U256, ChainError> {
        let tx = to_typed_transaction(request, None, None);
        self.provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn wait_for_receipt(
        &self,
        hash: H256,
        confirmations: usize,
        timeout: Duration,
    ) -> Result<Option<ConfirmedReceipt>, ChainError> {
        let pending = PendingTransaction::new(hash, &self.provider)
            .interval(RECEIPT_POLL_INTERVAL)
            .confirmations(confirmations);

        match tokio::time::timeout(timeout, pending).await {
            Ok(Ok(receipt)) => Ok(receipt.map(|r| ConfirmedReceipt {
                status: r.status.map(|s| s.as_u64()),
                block_number: r.block_number.map(|b| b.as_u64()),
            })),
            Ok(Err(e)) => Err(ChainError::Rpc(e.to_string())),
            Err(_) => Err(ChainError::Timeout {
                operation: format!("receipt of {:?} after {}s", hash, timeout.as_secs()),
            }),
        }
    }

    async fn raw_receipt(&self, hash: H256) -> Result<Option<RawReceipt>, ChainError> {
        self.provider
            .request::<_, Option<RawReceipt>>("eth_getTransactionReceipt", [hash])
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn transaction_nonce(&self, hash: H256) -> Result<Option<u64>, ChainError> {
        let tx = self
            .provider
            .get_transaction(hash)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(tx.map(|t| t.nonce.as_u64()))
    }
}

/// Build a typed transaction with explicit nonce and fee overrides
pub(crate) fn to_typed_transaction(
    request: &TxRequest,
    chain_id: Option<u64>,
    gas_limit: Option<U256>,
) -> TypedTransaction {
    match request.fees.pricing {
        GasPrice::Legacy(price) => {
            let mut tx = TransactionRequest::new()
                .from(request.from)
                .to(request.to)
                .data(request.data.clone())
                .nonce(request.fees.nonce)
                .gas_price(price);
            if let Some(chain_id) = chain_id {
                tx = tx.chain_id(chain_id);
            }
            if let Some(gas) = gas_limit {
                tx = tx.gas(gas);
            }
            TypedTransaction::Legacy(tx)
        }
        GasPrice::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            let mut tx = Eip1559TransactionRequest::new()
                .from(request.from)
                .to(request.to)
                .data(request.data.clone())
                .nonce(request.fees.nonce)
                .max_fee_per_gas(max_fee_per_gas)
                .max_priority_fee_per_gas(max_priority_fee_per_gas);
            if let Some(chain_id) = chain_id {
                tx = tx.chain_id(chain_id);
            }
            if let Some(gas) = gas_limit {
                tx = tx.gas(gas);
            }
            TypedTransaction::Eip1559(tx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::FeeFields;

    fn request(pricing: GasPrice) -> TxRequest {
        TxRequest {
            from: Address::repeat_byte(0x11),
            to: Address::repeat_byte(0x20),
            data: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]),
            fees: FeeFields { nonce: 7, pricing },
        }
    }

    #[test]
    fn test_modern_fields_build_eip1559() {
        let tx = to_typed_transaction(
            &request(GasPrice::Eip1559 {
                max_fee_per_gas: U256::from(40u64),
                max_priority_fee_per_gas: U256::from(1u64),
            }),
            Some(42431),
            Some(U256::from(60_000u64)),
        );

        match tx {
            TypedTransaction::Eip1559(inner) => {
                assert_eq!(inner.max_fee_per_gas, Some(U256::from(40u64)));
                assert_eq!(inner.max_priority_fee_per_gas, Some(U256::from(1u64)));
                assert_eq!(inner.nonce, Some(U256::from(7u64)));
                assert_eq!(inner.gas, Some(U256::from(60_000u64)));
            }
            other => panic!("expected EIP-1559 transaction, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_fields_build_legacy() {
        let tx = to_typed_transaction(&request(GasPrice::Legacy(U256::from(9u64))), None, None);

        match tx {
            TypedTransaction::Legacy(inner) => {
                assert_eq!(inner.gas_price, Some(U256::from(9u64)));
                assert_eq!(inner.nonce, Some(U256::from(7u64)));
                assert!(inner.gas.is_none());
            }
            other => panic!("expected legacy transaction, got {:?}", other),
        }
    }
}
