//! Runs one operation end to end
//!
//! feeQuote -> estimateGas -> preflight -> send -> waitAndVerify -> receipt.
//! Nothing is retried. The reserved nonce is consumed only after the receipt
//! has been verified.

use super::context::{RunContext, Stage};
use super::gas::FeeEstimator;
use super::operation::Operation;
use super::preflight::PreflightValidator;
use crate::chain::{LedgerEndpoint, TxRequest, TxSigner};
use crate::error::{RunError, RunResult};
use crate::report::TxReport;

use ethers::types::U256;
use ethers::utils::to_checksum;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Confirmation and explorer settings
#[derive(Debug, Clone)]
pub struct TxRunnerConfig {
    pub confirmations: usize,
    pub confirmation_timeout: Duration,
    /// Prefix the transaction hash is appended to
    pub explorer_tx_base: String,
}

/// Diagnostic summary of a transaction attached to stage errors
struct TxContext<'a> {
    operation: &'a Operation,
    request: &'a TxRequest,
    balance: Option<U256>,
}

impl std::fmt::Display for TxContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "action={}", self.operation.name)?;
        if let Some((token, counterparty, role)) = self.operation.kind.counterparty() {
            write!(
                f,
                " token={} tokenAddress={} {}={}",
                token.name,
                to_checksum(&token.address, None),
                role,
                to_checksum(&counterparty, None)
            )?;
        }
        write!(f, " wallet={}", to_checksum(&self.request.from, None))?;
        if let Some(amount) = self.operation.kind.amount() {
            write!(f, " amount={}", amount)?;
        }
        match self.balance {
            Some(balance) => write!(f, " balance={}", balance)?,
            None => write!(f, " balance=n/a")?,
        }
        write!(
            f,
            " nonce={} data={} feeFields={}",
            self.request.fees.nonce, self.request.data, self.request.fees
        )
    }
}

/// Executes operations one at a time against a ledger and signer
pub struct TxRunner {
    ledger: Arc<dyn LedgerEndpoint>,
    signer: Arc<dyn TxSigner>,
    preflight: PreflightValidator,
    config: TxRunnerConfig,
}

impl TxRunner {
    pub fn new(
        ledger: Arc<dyn LedgerEndpoint>,
        signer: Arc<dyn TxSigner>,
        preflight: PreflightValidator,
        config: TxRunnerConfig,
    ) -> Self {
        Self {
            ledger,
            signer,
            preflight,
            config,
        }
    }

    /// Run `operation` at the context's reserved nonce and return its verified report
    pub async fn execute(&self, ctx: &mut RunContext, operation: &Operation) -> RunResult<TxReport> {
        let name = operation.name.as_str();
        let sender = self.signer.address();

        ctx.enter_stage(name, Stage::FeeQuote);
        let nonce = ctx.reserved_nonce()?;
        let fees = FeeEstimator::fee_fields(self.ledger.as_ref(), nonce).await?;
        let request = TxRequest {
            from: sender,
            to: operation.kind.target(),
            data: operation.kind.encode(),
            fees,
        };
        let mut tx_context = TxContext {
            operation,
            request: &request,
            balance: None,
        };

        ctx.enter_stage(name, Stage::EstimateGas);
        let gas_limit = match self.ledger.estimate_gas(&request).await {
            Ok(gas_limit) => gas_limit,
            Err(source) => {
                error!("{} estimateGas failed: {}", name, source);
                return Err(RunError::Estimation {
                    step: ctx.step().to_string(),
                    context: tx_context.to_string(),
                    source,
                });
            }
        };
        debug!("{} gasLimit={} fees={}", name, gas_limit, request.fees);

        ctx.enter_stage(name, Stage::Preflight);
        tx_context.balance = self
            .preflight
            .run(ctx, operation, sender, gas_limit, &request.fees)
            .await?;

        ctx.enter_stage(name, Stage::Send);
        let hash = match self.signer.send_transaction(&request, gas_limit).await {
            Ok(hash) => hash,
            Err(source) => {
                error!("{} send failed: {}", name, source);
                return Err(RunError::Submission {
                    step: ctx.step().to_string(),
                    context: tx_context.to_string(),
                    source,
                });
            }
        };
        let hash_hex = format!("{:?}", hash);
        let explorer = format!("{}{}", self.config.explorer_tx_base, hash_hex);
        info!("{} sent hash={} nonce={} explorer={}", name, hash_hex, nonce, explorer);

        ctx.enter_stage(name, Stage::WaitAndVerify);
        let confirmation_error = |step: &str, reason: String| RunError::Confirmation {
            step: step.to_string(),
            context: tx_context.to_string(),
            reason,
        };
        let receipt = self
            .ledger
            .wait_for_receipt(hash, self.config.confirmations, self.config.confirmation_timeout)
            .await
            .map_err(|e| confirmation_error(ctx.step(), e.to_string()))?;
        match receipt {
            None => {
                return Err(confirmation_error(
                    ctx.step(),
                    format!("Missing receipt for tx={}", hash_hex),
                ));
            }
            Some(receipt) if !receipt.succeeded() => {
                let status = receipt
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(confirmation_error(
                    ctx.step(),
                    format!("Tx failed (status={}) tx={}", status, hash_hex),
                ));
            }
            Some(receipt) => {
                info!(
                    "{} confirmed hash={} block={:?}",
                    name, hash_hex, receipt.block_number
                );
            }
        }

        ctx.enter_stage(name, Stage::Receipt);
        let raw = self
            .ledger
            .raw_receipt(hash)
            .await?
            .ok_or_else(|| RunError::ReceiptSchema {
                name: name.to_string(),
                message: format!("{} receipt is null for tx={}", name, hash_hex),
            })?;
        let report = TxReport::from_raw_receipt(name, &hash_hex, &explorer, raw)?;

        let reported = self.ledger.transaction_nonce(hash).await?;
        if reported.is_none() {
            warn!("{} network did not report a nonce for tx={}", name, hash_hex);
        }
        let used = ctx.consume_nonce(reported, hash)?;

        info!(
            "{} verified nonce={} gasUsed={} effectiveGasPrice={} feeToken={} feePayer={}",
            name, used, report.gas_used, report.effective_gas_price, report.fee_token, report.fee_payer
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{
        ConfirmedReceipt, FeeData, MockLedgerEndpoint, MockTokenContracts, MockTxSigner,
        RawReceipt,
    };
    use crate::error::ChainError;
    use crate::tx::{NonceSequencer, TokenRef};
    use ethers::types::{Address, H256};
    use serde_json::json;

    fn sender() -> Address {
        Address::repeat_byte(0x11)
    }

    fn alpha() -> TokenRef {
        TokenRef::new("AlphaUSD", Address::repeat_byte(0x21))
    }

    fn tx_hash() -> H256 {
        H256::repeat_byte(0xab)
    }

    fn raw_receipt() -> RawReceipt {
        json!({
            "transactionHash": format!("{:?}", tx_hash()),
            "status": "0x1",
            "gasUsed": "0xc350",
            "effectiveGasPrice": "0x4a817c800",
            "feeToken": "0x2121212121212121212121212121212121212121",
            "feePayer": "0x1111111111111111111111111111111111111111"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn ledger() -> MockLedgerEndpoint {
        let mut ledger = MockLedgerEndpoint::new();
        ledger.expect_fee_data().returning(|| {
            Ok(FeeData {
                max_fee_per_gas: Some(U256::from(20_000_000_000u64)),
                max_priority_fee_per_gas: Some(U256::from(1_000_000_000u64)),
                gas_price: Some(U256::from(10_000_000_000u64)),
            })
        });
        ledger
            .expect_estimate_gas()
            .returning(|_| Ok(U256::from(50_000u64)));
        ledger
    }

    fn signer() -> MockTxSigner {
        let mut signer = MockTxSigner::new();
        signer.expect_address().return_const(sender());
        signer
    }

    /// Fee balance of exactly 1000 micro covers 50_000 gas at 20 gwei
    fn funded_contracts() -> MockTokenContracts {
        let mut contracts = MockTokenContracts::new();
        contracts
            .expect_balance_of()
            .returning(|_, _| Ok(U256::from(1_000u64)));
        contracts
    }

    fn runner(
        ledger: MockLedgerEndpoint,
        signer: MockTxSigner,
        contracts: MockTokenContracts,
    ) -> TxRunner {
        TxRunner::new(
            Arc::new(ledger),
            Arc::new(signer),
            PreflightValidator::new(Arc::new(contracts), alpha(), "USD", 6),
            TxRunnerConfig {
                confirmations: 1,
                confirmation_timeout: Duration::from_secs(5),
                explorer_tx_base: "https://explore.tempo.xyz/tx/".to_string(),
            },
        )
    }

    fn context(nonce: u64) -> RunContext {
        let mut ctx = RunContext::new();
        ctx.start_sequence(NonceSequencer::starting_at(nonce));
        ctx
    }

    fn operation() -> Operation {
        Operation::fee_preference(Address::repeat_byte(0xfe), alpha())
    }

    fn confirmed(status: u64) -> Option<ConfirmedReceipt> {
        Some(ConfirmedReceipt {
            status: Some(status),
            block_number: Some(100),
        })
    }

    #[tokio::test]
    async fn test_successful_operation_consumes_one_nonce() {
        let mut ledger = ledger();
        ledger
            .expect_wait_for_receipt()
            .returning(|_, _, _| Ok(confirmed(1)));
        ledger
            .expect_raw_receipt()
            .returning(|_| Ok(Some(raw_receipt())));
        ledger.expect_transaction_nonce().returning(|_| Ok(Some(7)));

        let mut signer = signer();
        signer
            .expect_send_transaction()
            .withf(|request, gas_limit| {
                request.fees.nonce == 7
                    && request.to == Address::repeat_byte(0xfe)
                    && *gas_limit == U256::from(50_000u64)
            })
            .times(1)
            .returning(|_, _| Ok(tx_hash()));

        let mut ctx = context(7);
        let report = runner(ledger, signer, funded_contracts())
            .execute(&mut ctx, &operation())
            .await
            .unwrap();

        assert_eq!(report.name, "feePreference:setUserToken(AlphaUSD)");
        assert_eq!(report.gas_used, "50000");
        assert_eq!(report.effective_gas_price, "20000000000");
        assert!(report.explorer.starts_with("https://explore.tempo.xyz/tx/0xabab"));
        assert_eq!(ctx.reserved_nonce().unwrap(), 8);
        assert_eq!(ctx.step(), "feePreference:setUserToken(AlphaUSD) receipt");
        assert_eq!(ctx.preflight().len(), 1);
    }

    #[tokio::test]
    async fn test_estimation_failure_never_submits() {
        let mut ledger = MockLedgerEndpoint::new();
        ledger.expect_fee_data().returning(|| {
            Ok(FeeData {
                gas_price: Some(U256::from(1u64)),
                ..Default::default()
            })
        });
        ledger
            .expect_estimate_gas()
            .returning(|_| Err(ChainError::Rpc("execution reverted".to_string())));

        let mut signer = signer();
        signer.expect_send_transaction().never();

        let mut ctx = context(3);
        let err = runner(ledger, signer, MockTokenContracts::new())
            .execute(&mut ctx, &operation())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::EstimateGas));
        let message = err.to_string();
        assert!(message.contains("estimateGas failed"), "{}", message);
        assert!(message.contains("nonce=3"), "{}", message);
        assert!(message.contains("gasPrice=1"), "{}", message);
        assert_eq!(ctx.reserved_nonce().unwrap(), 3);
        assert!(ctx.preflight().is_empty());
    }

    #[tokio::test]
    async fn test_fee_budget_shortfall_never_submits() {
        let mut contracts = MockTokenContracts::new();
        contracts
            .expect_balance_of()
            .returning(|_, _| Ok(U256::from(999u64)));

        let mut signer = signer();
        signer.expect_send_transaction().never();

        let mut ctx = context(0);
        let err = runner(ledger(), signer, contracts)
            .execute(&mut ctx, &operation())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Preflight(_)));
        assert_eq!(ctx.step(), "feePreference:setUserToken(AlphaUSD) preflight");
        assert_eq!(ctx.preflight().len(), 1);
    }

    #[tokio::test]
    async fn test_submission_failure_is_tagged_send() {
        let mut signer = signer();
        signer
            .expect_send_transaction()
            .returning(|_, _| Err(ChainError::Rpc("nonce too low".to_string())));

        let mut ctx = context(0);
        let err = runner(ledger(), signer, funded_contracts())
            .execute(&mut ctx, &operation())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Send));
        assert!(err.to_string().contains("nonce too low"));
        assert_eq!(ctx.step(), "feePreference:setUserToken(AlphaUSD) send");
        assert_eq!(ctx.reserved_nonce().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reverted_transaction_fails_confirmation() {
        let mut ledger = ledger();
        ledger
            .expect_wait_for_receipt()
            .returning(|_, _, _| Ok(confirmed(0)));
        ledger.expect_raw_receipt().never();

        let mut signer = signer();
        signer
            .expect_send_transaction()
            .returning(|_, _| Ok(tx_hash()));

        let mut ctx = context(0);
        let err = runner(ledger, signer, funded_contracts())
            .execute(&mut ctx, &operation())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::WaitAndVerify));
        assert!(err.to_string().contains("Tx failed (status=0)"));
    }

    #[tokio::test]
    async fn test_missing_receipt_fails_confirmation() {
        let mut ledger = ledger();
        ledger
            .expect_wait_for_receipt()
            .returning(|_, _, _| Ok(None));

        let mut signer = signer();
        signer
            .expect_send_transaction()
            .returning(|_, _| Ok(tx_hash()));

        let mut ctx = context(0);
        let err = runner(ledger, signer, funded_contracts())
            .execute(&mut ctx, &operation())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Missing receipt for tx=0xabab"));
    }

    #[tokio::test]
    async fn test_confirmation_timeout() {
        let mut ledger = ledger();
        ledger.expect_wait_for_receipt().returning(|_, _, _| {
            Err(ChainError::Timeout {
                operation: "receipt".to_string(),
            })
        });

        let mut signer = signer();
        signer
            .expect_send_transaction()
            .returning(|_, _| Ok(tx_hash()));

        let mut ctx = context(0);
        let err = runner(ledger, signer, funded_contracts())
            .execute(&mut ctx, &operation())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::WaitAndVerify));
        assert!(err.to_string().contains("Timeout waiting for receipt"));
    }

    #[tokio::test]
    async fn test_receipt_without_fee_payer_is_rejected() {
        let mut ledger = ledger();
        ledger
            .expect_wait_for_receipt()
            .returning(|_, _, _| Ok(confirmed(1)));
        ledger.expect_raw_receipt().returning(|_| {
            let mut raw = raw_receipt();
            raw.remove("feePayer");
            Ok(Some(raw))
        });

        let mut signer = signer();
        signer
            .expect_send_transaction()
            .returning(|_, _| Ok(tx_hash()));

        let mut ctx = context(0);
        let err = runner(ledger, signer, funded_contracts())
            .execute(&mut ctx, &operation())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::ReceiptSchema { .. }));
        assert!(err.to_string().contains("feePayer"));
        assert!(err
            .to_string()
            .contains(&format!("tx={:?}", tx_hash())));
        assert_eq!(ctx.reserved_nonce().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_null_raw_receipt_is_schema_error() {
        let mut ledger = ledger();
        ledger
            .expect_wait_for_receipt()
            .returning(|_, _, _| Ok(confirmed(1)));
        ledger.expect_raw_receipt().returning(|_| Ok(None));

        let mut signer = signer();
        signer
            .expect_send_transaction()
            .returning(|_, _| Ok(tx_hash()));

        let mut ctx = context(0);
        let err = runner(ledger, signer, funded_contracts())
            .execute(&mut ctx, &operation())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::ReceiptSchema { .. }));
        assert!(err.to_string().contains("receipt is null"));
    }

    #[tokio::test]
    async fn test_reported_nonce_mismatch_aborts() {
        let mut ledger = ledger();
        ledger
            .expect_wait_for_receipt()
            .returning(|_, _, _| Ok(confirmed(1)));
        ledger
            .expect_raw_receipt()
            .returning(|_| Ok(Some(raw_receipt())));
        ledger.expect_transaction_nonce().returning(|_| Ok(Some(9)));

        let mut signer = signer();
        signer
            .expect_send_transaction()
            .returning(|_, _| Ok(tx_hash()));

        let mut ctx = context(5);
        let err = runner(ledger, signer, funded_contracts())
            .execute(&mut ctx, &operation())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunError::NonceMismatch {
                assigned: 5,
                reported: 9,
                ..
            }
        ));
    }
}
