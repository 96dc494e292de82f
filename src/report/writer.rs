//! JSON report persistence

use super::{FailureReport, RunReport};
use crate::error::ReportError;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Durable sink for the final report of a run
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReportWriter: Send + Sync {
    async fn write_run(&self, report: &RunReport) -> Result<PathBuf, ReportError>;

    async fn write_failure(&self, report: &FailureReport) -> Result<PathBuf, ReportError>;
}

/// Writes `<base>/<dateJst>/run-<HHMMSS>.json`, or `.failure.json` for failures
pub struct FileReportWriter {
    base_dir: PathBuf,
}

impl FileReportWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn report_path(&self, date_jst: &str, time_jst: &str, suffix: &str) -> PathBuf {
        let run_id = time_jst.replace(':', "");
        self.base_dir
            .join(date_jst)
            .join(format!("run-{}{}.json", run_id, suffix))
    }

    async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), ReportError> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(value)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl ReportWriter for FileReportWriter {
    async fn write_run(&self, report: &RunReport) -> Result<PathBuf, ReportError> {
        let path = self.report_path(&report.header.date_jst, &report.header.time_jst, "");
        Self::write_json(&path, report).await?;
        info!("Wrote run report {}", path.display());
        Ok(path)
    }

    async fn write_failure(&self, report: &FailureReport) -> Result<PathBuf, ReportError> {
        let path = self.report_path(
            &report.header.date_jst,
            &report.header.time_jst,
            ".failure",
        );
        Self::write_json(&path, report).await?;
        info!("Wrote failure report {}", path.display());
        Ok(path)
    }
}
