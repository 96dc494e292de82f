//! Mutable state of one run, threaded through every stage

use super::nonce::NonceSequencer;
use super::preflight::{PreflightDetail, PreflightRecord};
use crate::error::{RunError, RunResult};
use crate::report::TxReport;

use ethers::types::{Address, H256};
use tracing::info;

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    ChainVerified,
    WalletLoaded,
    /// Executing the operation at this index
    Running(usize),
    Completed,
    Failed,
}

/// Stage of a single operation inside the transaction runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FeeQuote,
    EstimateGas,
    Preflight,
    Send,
    WaitAndVerify,
    Receipt,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::FeeQuote => "feeQuote",
            Stage::EstimateGas => "estimateGas",
            Stage::Preflight => "preflight",
            Stage::Send => "send",
            Stage::WaitAndVerify => "waitAndVerify",
            Stage::Receipt => "receipt",
        };
        f.write_str(label)
    }
}

/// Run state: phase, step label, nonce counter, preflight log and finished transactions
#[derive(Debug)]
pub struct RunContext {
    phase: RunPhase,
    step: String,
    nonces: Option<NonceSequencer>,
    preflight: PreflightRecord,
    completed: Vec<TxReport>,
    wallet: Option<Address>,
    sink: Option<Address>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Init,
            step: "init".to_string(),
            nonces: None,
            preflight: PreflightRecord::default(),
            completed: Vec::new(),
            wallet: None,
            sink: None,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn advance_phase(&mut self, phase: RunPhase) {
        self.phase = phase;
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    /// Set a run-level step label such as `verifyChain`
    pub fn set_step(&mut self, step: impl Into<String>) {
        self.step = step.into();
        info!("step={}", self.step);
    }

    /// Set the step label to `<operation> <stage>`
    pub fn enter_stage(&mut self, operation: &str, stage: Stage) {
        self.set_step(format!("{} {}", operation, stage));
    }

    pub fn set_parties(&mut self, wallet: Address, sink: Address) {
        self.wallet = Some(wallet);
        self.sink = Some(sink);
    }

    pub fn wallet(&self) -> Option<Address> {
        self.wallet
    }

    pub fn sink(&self) -> Option<Address> {
        self.sink
    }

    pub fn start_sequence(&mut self, nonces: NonceSequencer) {
        self.nonces = Some(nonces);
    }

    /// Nonce reserved for the next transaction
    pub fn reserved_nonce(&self) -> RunResult<u64> {
        self.nonces
            .as_ref()
            .map(NonceSequencer::reserved)
            .ok_or_else(|| RunError::Internal("nonce sequencer not initialized".to_string()))
    }

    /// Nonces consumed by verified transactions
    pub fn nonces_issued(&self) -> u64 {
        self.nonces.as_ref().map_or(0, NonceSequencer::issued)
    }

    /// Check the network-reported nonce, then consume the reserved one
    pub fn consume_nonce(&mut self, reported: Option<u64>, hash: H256) -> RunResult<u64> {
        let nonces = self
            .nonces
            .as_mut()
            .ok_or_else(|| RunError::Internal("nonce sequencer not initialized".to_string()))?;
        if let Some(reported) = reported {
            nonces.verify_accepted(reported, hash)?;
        }
        Ok(nonces.next())
    }

    /// Append a preflight entry under the current step label
    pub fn record(&mut self, detail: PreflightDetail) {
        self.preflight.append(&self.step, detail);
    }

    pub fn preflight(&self) -> &PreflightRecord {
        &self.preflight
    }

    pub fn complete(&mut self, report: TxReport) {
        self.completed.push(report);
    }

    pub fn completed(&self) -> &[TxReport] {
        &self.completed
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        let mut ctx = RunContext::new();
        assert_eq!(ctx.step(), "init");

        ctx.enter_stage("transfer:AlphaUSD", Stage::Send);
        assert_eq!(ctx.step(), "transfer:AlphaUSD send");

        ctx.enter_stage("transfer:AlphaUSD", Stage::WaitAndVerify);
        assert_eq!(ctx.step(), "transfer:AlphaUSD waitAndVerify");
    }

    #[test]
    fn test_nonce_requires_sequence() {
        let mut ctx = RunContext::new();
        assert!(matches!(ctx.reserved_nonce(), Err(RunError::Internal(_))));

        ctx.start_sequence(NonceSequencer::starting_at(8));
        assert_eq!(ctx.reserved_nonce().unwrap(), 8);
        assert_eq!(ctx.consume_nonce(Some(8), H256::zero()).unwrap(), 8);
        assert_eq!(ctx.reserved_nonce().unwrap(), 9);
        assert_eq!(ctx.consume_nonce(None, H256::zero()).unwrap(), 9);
    }

    #[test]
    fn test_mismatch_does_not_consume() {
        let mut ctx = RunContext::new();
        ctx.start_sequence(NonceSequencer::starting_at(2));

        assert!(matches!(
            ctx.consume_nonce(Some(3), H256::zero()),
            Err(RunError::NonceMismatch { .. })
        ));
        assert_eq!(ctx.reserved_nonce().unwrap(), 2);
    }

    #[test]
    fn test_phase_and_issued_nonces() {
        let mut ctx = RunContext::new();
        assert_eq!(ctx.phase(), RunPhase::Init);
        assert_eq!(ctx.nonces_issued(), 0);

        ctx.start_sequence(NonceSequencer::starting_at(4));
        ctx.advance_phase(RunPhase::Running(0));
        ctx.consume_nonce(Some(4), H256::zero()).unwrap();
        assert_eq!(ctx.phase(), RunPhase::Running(0));
        assert_eq!(ctx.nonces_issued(), 1);
    }
}
