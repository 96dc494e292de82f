//! In-memory chain and report sink for multi-operation scenarios

use crate::chain::{
    ConfirmedReceipt, FeeData, LedgerEndpoint, RawReceipt, TokenContracts, TxRequest, TxSigner,
};
use crate::error::{ChainError, ReportError};
use crate::report::{FailureReport, ReportWriter, RunReport};

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

pub const FAKE_CHAIN_ID: u64 = 42431;

#[derive(Default)]
struct ChainState {
    sent: Vec<TxRequest>,
    nonces: HashMap<H256, u64>,
}

/// A healthy single-wallet chain that accepts everything unless told otherwise
pub struct FakeChain {
    pub chain_id: u64,
    pub wallet: Address,
    pub start_nonce: u64,
    pub fee_token: Address,
    /// Zero-based index of the submission that is rejected
    pub fail_send_at: Option<usize>,
    /// Token whose wallet balance reads as zero
    pub empty_token: Option<Address>,
    state: Mutex<ChainState>,
}

impl FakeChain {
    pub fn new(wallet: Address, fee_token: Address) -> Self {
        Self {
            chain_id: FAKE_CHAIN_ID,
            wallet,
            start_nonce: 0,
            fee_token,
            fail_send_at: None,
            empty_token: None,
            state: Mutex::new(ChainState::default()),
        }
    }

    /// Requests submitted so far, in order
    pub fn sent(&self) -> Vec<TxRequest> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl LedgerEndpoint for FakeChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.chain_id)
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64, ChainError> {
        Ok(self.start_nonce)
    }

    async fn fee_data(&self) -> Result<FeeData, ChainError> {
        Ok(FeeData {
            max_fee_per_gas: Some(U256::from(2_000_000_000u64)),
            max_priority_fee_per_gas: Some(U256::from(1_000_000_000u64)),
            gas_price: Some(U256::from(1_000_000_000u64)),
        })
    }

    async fn estimate_gas(&self, _request: &TxRequest) -> Result<U256, ChainError> {
        Ok(U256::from(50_000u64))
    }

    async fn wait_for_receipt(
        &self,
        hash: H256,
        _confirmations: usize,
        _timeout: Duration,
    ) -> Result<Option<ConfirmedReceipt>, ChainError> {
        let known = self.state.lock().unwrap().nonces.contains_key(&hash);
        Ok(known.then_some(ConfirmedReceipt {
            status: Some(1),
            block_number: Some(1_000),
        }))
    }

    async fn raw_receipt(&self, hash: H256) -> Result<Option<RawReceipt>, ChainError> {
        let receipt = json!({
            "transactionHash": format!("{:?}", hash),
            "status": "0x1",
            "gasUsed": "0xc350",
            "effectiveGasPrice": "0x77359400",
            "feeToken": format!("{:?}", self.fee_token),
            "feePayer": format!("{:?}", self.wallet),
        });
        Ok(receipt.as_object().cloned())
    }

    async fn transaction_nonce(&self, hash: H256) -> Result<Option<u64>, ChainError> {
        Ok(self.state.lock().unwrap().nonces.get(&hash).copied())
    }
}

#[async_trait]
impl TxSigner for FakeChain {
    fn address(&self) -> Address {
        self.wallet
    }

    async fn send_transaction(
        &self,
        request: &TxRequest,
        _gas_limit: U256,
    ) -> Result<H256, ChainError> {
        let mut state = self.state.lock().unwrap();
        if self.fail_send_at == Some(state.sent.len()) {
            return Err(ChainError::Rpc("replacement transaction underpriced".to_string()));
        }

        let hash = H256::from_low_u64_be(request.fees.nonce + 1);
        state.sent.push(request.clone());
        state.nonces.insert(hash, request.fees.nonce);
        Ok(hash)
    }
}

#[async_trait]
impl TokenContracts for FakeChain {
    async fn balance_of(&self, token: Address, _owner: Address) -> Result<U256, ChainError> {
        if self.empty_token == Some(token) {
            return Ok(U256::zero());
        }
        Ok(U256::from(1_000_000_000_000u64))
    }

    async fn paused(&self, _token: Address) -> Result<bool, ChainError> {
        Ok(false)
    }

    async fn currency(&self, _token: Address) -> Result<String, ChainError> {
        Ok("USD".to_string())
    }

    async fn decimals(&self, _token: Address) -> Result<u8, ChainError> {
        Ok(6)
    }

    async fn transfer_policy_id(&self, _token: Address) -> Result<u64, ChainError> {
        Ok(1)
    }

    async fn is_authorized(&self, _policy_id: u64, _account: Address) -> Result<bool, ChainError> {
        Ok(true)
    }
}

/// Keeps reports in memory; optionally fails every write
#[derive(Default)]
pub struct MemoryReportWriter {
    pub fail_writes: bool,
    pub runs: Mutex<Vec<RunReport>>,
    pub failures: Mutex<Vec<FailureReport>>,
}

#[async_trait]
impl ReportWriter for MemoryReportWriter {
    async fn write_run(&self, report: &RunReport) -> Result<PathBuf, ReportError> {
        if self.fail_writes {
            return Err(ReportError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only report dir",
            )));
        }
        self.runs.lock().unwrap().push(report.clone());
        Ok(PathBuf::from("memory/run.json"))
    }

    async fn write_failure(&self, report: &FailureReport) -> Result<PathBuf, ReportError> {
        if self.fail_writes {
            return Err(ReportError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only report dir",
            )));
        }
        self.failures.lock().unwrap().push(report.clone());
        Ok(PathBuf::from("memory/run.failure.json"))
    }
}
