//! Run orchestration
//!
//! The orchestrator:
//! 1. Verifies the endpoint serves the configured chain
//! 2. Loads the wallet and initializes the nonce sequence
//! 3. Executes the fixed operation list strictly in order
//! 4. Writes exactly one success or failure report

pub mod engine;
pub mod plan;

pub use engine::{RunOrchestrator, RunOutcome, RunSettings};
pub use plan::{daily_plan, PlanInputs};
