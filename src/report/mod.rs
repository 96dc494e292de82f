//! Run reports
//!
//! Handles:
//! - Per-transaction reports built from raw receipts
//! - The success and failure documents of a run
//! - JST run timestamps
//! - Durable JSON persistence

mod clock;
mod receipt;
mod writer;

pub use clock::RunClock;
pub use writer::{FileReportWriter, ReportWriter};

#[cfg(test)]
pub use writer::MockReportWriter;

use crate::chain::RawReceipt;
use crate::error::RunError;
use crate::tx::PreflightEntry;

use serde::{Deserialize, Serialize};

/// Verified outcome of one confirmed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReport {
    pub name: String,
    pub hash: String,
    pub explorer: String,
    /// Decimal string
    pub gas_used: String,
    /// Decimal string
    pub effective_gas_price: String,
    pub fee_token: String,
    pub fee_payer: String,
    pub receipt_raw: RawReceipt,
}

/// Fields shared by both report documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportHeader {
    pub date_jst: String,
    pub time_jst: String,
    pub chain_id: u64,
    pub rpc_url: String,
}

/// Written once when every operation succeeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    #[serde(flatten)]
    pub header: ReportHeader,
    pub wallet: String,
    pub sink: String,
    pub items: Vec<TxReport>,
}

/// Error section of a failure report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl From<&RunError> for FailureDetail {
    fn from(error: &RunError) -> Self {
        Self {
            message: error.to_string(),
            stack: error.cause_chain(),
        }
    }
}

/// Written once when a run stops on its first error
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    #[serde(flatten)]
    pub header: ReportHeader,
    pub wallet: Option<String>,
    pub sink: Option<String>,
    /// Step label active when the error was raised
    pub step: String,
    pub preflight: Vec<PreflightEntry>,
    /// Transactions confirmed before the failure
    pub completed: Vec<TxReport>,
    pub error: FailureDetail,
}
