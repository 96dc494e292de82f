//! Transaction pipeline: nonce sequencing, fee selection, preflight and submission

mod context;
mod gas;
mod nonce;
pub mod operation;
mod preflight;
mod runner;

pub use context::{RunContext, RunPhase, Stage};
pub use nonce::NonceSequencer;
pub use operation::{max_uint160, CounterpartyRole, Operation, TokenRef, MAX_UINT48};
pub use preflight::{PreflightEntry, PreflightValidator};
pub use runner::{TxRunner, TxRunnerConfig};
