//! Non-fatal warning log: recoverable conditions that the run continues past
//! but that a reviewer should see (negative cash under `continue_on_negative_cash`,
//! slippage falling back to spread-only, risk rejections).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    NegativeCashContinued,
    SlippageNumericalFallback,
    RiskRejection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub ts: DateTime<Utc>,
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    records: Vec<DiagnosticRecord>,
}

impl Diagnostics {
    pub fn push(&mut self, ts: DateTime<Utc>, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(?kind, %message, "diagnostic recorded");
        self.records.push(DiagnosticRecord { ts, kind, message });
    }

    pub fn records(&self) -> &[DiagnosticRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<DiagnosticRecord> {
        self.records
    }
}
