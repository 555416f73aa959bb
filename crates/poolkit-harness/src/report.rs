//! Scenario reports and JSONL emission.
//!
//! One [`ScenarioReport`] per workload run, serialized as a single JSON
//! line so runs can be appended to a log file and aggregated later.

use crate::error::HarnessError;

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Workload verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
}

/// Machine-readable record of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name (`churn`, `exhaustion`, `contention`, `table-sweep`).
    pub scenario: String,
    /// Seed the workload ran with (0 when not seeded).
    pub seed: u64,
    /// Allocator operations performed.
    pub ops: u64,
    /// Distinct addresses observed across the run.
    pub distinct_addresses: usize,
    /// Growth events recorded by the backing page pool.
    pub grow_events: u64,
    /// Blocks provisioned by the backing page pool at the end of the run.
    pub blocks_total: usize,
    /// Wall-clock duration of the workload.
    pub elapsed_ms: u64,
    /// Verdict.
    pub outcome: Outcome,
    /// Free-form notes (first failure, counters, etc.).
    pub notes: Vec<String>,
}

impl ScenarioReport {
    /// Serializes the report as one JSON line.
    pub fn to_json_line(&self) -> Result<String, HarnessError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Writes reports as JSONL to stdout or a file.
pub struct ReportEmitter {
    sink: Box<dyn Write>,
}

impl ReportEmitter {
    /// Emitter writing to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            sink: Box::new(std::io::stdout()),
        }
    }

    /// Emitter appending to the file at `path`.
    pub fn file(path: &Path) -> Result<Self, HarnessError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            sink: Box::new(file),
        })
    }

    /// Writes one report as a JSON line.
    pub fn emit(&mut self, report: &ScenarioReport) -> Result<(), HarnessError> {
        let line = report.to_json_line()?;
        writeln!(self.sink, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_round_trips_through_json() {
        let report = ScenarioReport {
            scenario: "churn".to_owned(),
            seed: 7,
            ops: 1000,
            distinct_addresses: 42,
            grow_events: 3,
            blocks_total: 8,
            elapsed_ms: 12,
            outcome: Outcome::Pass,
            notes: vec!["fill verified".to_owned()],
        };
        let line = report.to_json_line().expect("serializable");
        let back: ScenarioReport = serde_json::from_str(&line).expect("parseable");
        assert_eq!(back.scenario, "churn");
        assert_eq!(back.outcome, Outcome::Pass);
        assert_eq!(back.notes.len(), 1);
    }

    #[test]
    fn outcome_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Outcome::Fail).expect("serializable"),
            "\"fail\""
        );
    }
}
