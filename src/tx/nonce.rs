//! Nonce sequencing for one run
//!
//! The sequencer is initialized once from the sender's pending transaction count
//! and hands out strictly consecutive nonces. A nonce is only consumed after its
//! transaction has been confirmed and verified.

use crate::chain::LedgerEndpoint;
use crate::error::{RunError, RunResult};

use ethers::types::{Address, H256};
use tracing::debug;

/// Issues strictly increasing nonces for a single sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceSequencer {
    /// Nonce the run started from
    start: u64,
    /// Currently reserved nonce (next to use)
    current: u64,
}

impl NonceSequencer {
    /// Create a sequencer that starts at `start`
    pub fn starting_at(start: u64) -> Self {
        Self {
            start,
            current: start,
        }
    }

    /// Initialize from the sender's pending transaction count
    pub async fn init(ledger: &dyn LedgerEndpoint, sender: Address) -> RunResult<Self> {
        let on_chain_nonce = ledger.pending_nonce(sender).await?;
        debug!("Initialized nonce for {:?}: {}", sender, on_chain_nonce);
        Ok(Self::starting_at(on_chain_nonce))
    }

    /// Currently reserved nonce, without consuming it
    pub fn reserved(&self) -> u64 {
        self.current
    }

    /// Return the reserved nonce and advance by one
    pub fn next(&mut self) -> u64 {
        let nonce = self.current;
        self.current += 1;
        debug!("Consumed nonce {}", nonce);
        nonce
    }

    /// Number of nonces consumed so far
    pub fn issued(&self) -> u64 {
        self.current - self.start
    }

    /// Check the nonce the network reports for an accepted transaction
    pub fn verify_accepted(&self, reported: u64, hash: H256) -> RunResult<()> {
        if reported != self.current {
            return Err(RunError::NonceMismatch {
                assigned: self.current,
                reported,
                hash: format!("{:?}", hash),
            });
        }
        Ok(())
    }
}
