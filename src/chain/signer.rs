//! Local wallet signer that broadcasts raw signed transactions

use super::provider::to_typed_transaction;
use super::{TxRequest, TxSigner};
use crate::error::ChainError;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use std::path::Path;
use tracing::{debug, info};

/// Signs with a decrypted keystore wallet and sends through the shared provider
pub struct WalletSigner {
    wallet: LocalWallet,
    provider: Provider<Http>,
    chain_id: u64,
}

impl WalletSigner {
    pub fn new(wallet: LocalWallet, provider: Provider<Http>, chain_id: u64) -> Self {
        let wallet = wallet.with_chain_id(chain_id);
        info!("Transaction signer initialized with wallet: {:?}", wallet.address());
        Self {
            wallet,
            provider,
            chain_id,
        }
    }

    /// Decrypt an encrypted JSON keystore
    pub fn decrypt_keystore(path: &Path, password: &str) -> Result<LocalWallet, ChainError> {
        LocalWallet::decrypt_keystore(path, password).map_err(|e| {
            ChainError::Signer(format!("Failed to decrypt keystore {}: {}", path.display(), e))
        })
    }
}

#[async_trait]
impl TxSigner for WalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn send_transaction(
        &self,
        request: &TxRequest,
        gas_limit: U256,
    ) -> Result<H256, ChainError> {
        let tx = to_typed_transaction(request, Some(self.chain_id), Some(gas_limit));

        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| ChainError::Signer(e.to_string()))?;
        let signed_tx = tx.rlp_signed(&signature);

        let pending_tx = self
            .provider
            .send_raw_transaction(signed_tx)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        let tx_hash = pending_tx.tx_hash();
        debug!("Broadcast tx {:?} with nonce {}", tx_hash, request.fees.nonce);
        Ok(tx_hash)
    }
}
