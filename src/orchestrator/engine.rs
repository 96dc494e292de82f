//! Sequential run engine with a single error catch point

use crate::chain::{LedgerEndpoint, TokenContracts, TxSigner};
use crate::error::{RunError, RunResult};
use crate::report::{
    FailureDetail, FailureReport, ReportHeader, ReportWriter, RunClock, RunReport,
};
use crate::tx::{
    NonceSequencer, Operation, PreflightValidator, RunContext, RunPhase, TokenRef, TxRunner,
    TxRunnerConfig,
};

use ethers::types::Address;
use ethers::utils::to_checksum;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Everything the engine needs besides its collaborators
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub chain_id: u64,
    pub rpc_url: String,
    pub sink: Address,
    pub fee_token: TokenRef,
    pub expected_currency: String,
    pub token_decimals: u8,
    pub runner: TxRunnerConfig,
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        report: PathBuf,
        transactions: usize,
    },
    Failed {
        step: String,
        message: String,
        /// `None` if the failure report itself could not be written
        report: Option<PathBuf>,
    },
}

/// Drives one run from chain verification to the final report
pub struct RunOrchestrator {
    settings: RunSettings,
    operations: Vec<Operation>,
    ledger: Arc<dyn LedgerEndpoint>,
    contracts: Arc<dyn TokenContracts>,
    writer: Arc<dyn ReportWriter>,
    clock: RunClock,
}

impl RunOrchestrator {
    pub fn new(
        settings: RunSettings,
        operations: Vec<Operation>,
        ledger: Arc<dyn LedgerEndpoint>,
        contracts: Arc<dyn TokenContracts>,
        writer: Arc<dyn ReportWriter>,
        clock: RunClock,
    ) -> Self {
        Self {
            settings,
            operations,
            ledger,
            contracts,
            writer,
            clock,
        }
    }

    /// Execute the run. `load_signer` is invoked once, after the chain is verified.
    pub async fn run<F>(&self, load_signer: F) -> RunOutcome
    where
        F: FnOnce() -> RunResult<Arc<dyn TxSigner>>,
    {
        info!(
            "Run started at {} chainId={} operations={}",
            self.clock.timestamp,
            self.settings.chain_id,
            self.operations.len()
        );

        let mut ctx = RunContext::new();
        match self.drive(&mut ctx, load_signer).await {
            Ok(report) => {
                ctx.advance_phase(RunPhase::Completed);
                info!(
                    "Run completed: {} transactions, {} nonces consumed, report={}",
                    ctx.completed().len(),
                    ctx.nonces_issued(),
                    report.display()
                );
                RunOutcome::Completed {
                    report,
                    transactions: ctx.completed().len(),
                }
            }
            Err(e) => self.fail(&mut ctx, e).await,
        }
    }

    async fn drive<F>(&self, ctx: &mut RunContext, load_signer: F) -> RunResult<PathBuf>
    where
        F: FnOnce() -> RunResult<Arc<dyn TxSigner>>,
    {
        ctx.set_step("verifyChain");
        let actual = self.ledger.chain_id().await?;
        if actual != self.settings.chain_id {
            return Err(RunError::ChainMismatch {
                expected: self.settings.chain_id,
                actual,
            });
        }
        ctx.advance_phase(RunPhase::ChainVerified);

        ctx.set_step("loadWallet");
        let signer = load_signer()?;
        let wallet = signer.address();
        ctx.set_parties(wallet, self.settings.sink);
        ctx.advance_phase(RunPhase::WalletLoaded);
        info!(
            "wallet={} sink={}",
            to_checksum(&wallet, None),
            to_checksum(&self.settings.sink, None)
        );

        ctx.set_step("initNonce");
        let nonces = NonceSequencer::init(self.ledger.as_ref(), wallet).await?;
        info!("Starting nonce {}", nonces.reserved());
        ctx.start_sequence(nonces);

        let runner = TxRunner::new(
            self.ledger.clone(),
            signer,
            PreflightValidator::new(
                self.contracts.clone(),
                self.settings.fee_token.clone(),
                self.settings.expected_currency.clone(),
                self.settings.token_decimals,
            ),
            self.settings.runner.clone(),
        );

        let total = self.operations.len();
        for (index, operation) in self.operations.iter().enumerate() {
            ctx.advance_phase(RunPhase::Running(index));
            info!("[{}/{}] {}", index + 1, total, operation.name);
            let report = runner.execute(ctx, operation).await?;
            ctx.complete(report);
        }

        ctx.set_step("writeReport");
        let report = RunReport {
            header: self.header(),
            wallet: to_checksum(&wallet, None),
            sink: to_checksum(&self.settings.sink, None),
            items: ctx.completed().to_vec(),
        };
        Ok(self.writer.write_run(&report).await?)
    }

    async fn fail(&self, ctx: &mut RunContext, error: RunError) -> RunOutcome {
        error!(
            "Run failed at step={} phase={:?}: {}",
            ctx.step(),
            ctx.phase(),
            error
        );
        ctx.advance_phase(RunPhase::Failed);
        if let Some(stack) = error.cause_chain() {
            error!("{}", stack);
        }

        let report = FailureReport {
            header: self.header(),
            wallet: ctx.wallet().map(|a| to_checksum(&a, None)),
            sink: ctx.sink().map(|a| to_checksum(&a, None)),
            step: ctx.step().to_string(),
            preflight: ctx.preflight().entries().to_vec(),
            completed: ctx.completed().to_vec(),
            error: FailureDetail::from(&error),
        };

        let path = match self.writer.write_failure(&report).await {
            Ok(path) => Some(path),
            Err(write_error) => {
                error!("Failed to write failure report: {}", write_error);
                None
            }
        };

        RunOutcome::Failed {
            step: report.step,
            message: error.to_string(),
            report: path,
        }
    }

    fn header(&self) -> ReportHeader {
        ReportHeader {
            date_jst: self.clock.date.clone(),
            time_jst: self.clock.time.clone(),
            chain_id: self.settings.chain_id,
            rpc_url: self.settings.rpc_url.clone(),
        }
    }
}
