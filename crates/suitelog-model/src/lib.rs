//! Suite-run data model and newest-completed run selection.
//!
//! A [`SuiteRun`] is one recorded execution of a test suite; selection picks
//! the most recently completed one out of a snapshot of candidates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Succeeded,
    Failed,
    Skipped,
    #[serde(other)]
    Unknown,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one named test within a suite run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
}

/// One execution of a test suite as recorded by the cluster-side controller.
///
/// `completion_time == None` means the run is still in progress and is never
/// eligible for selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteRun {
    pub name: String,
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: Vec<TestResult>,
}

impl SuiteRun {
    /// Looks up the recorded status for a named test definition within this run.
    pub fn result_status(&self, def_name: &str) -> Result<TestStatus, UnknownTestDefinition> {
        self.results
            .iter()
            .find(|result| result.name == def_name)
            .map(|result| result.status)
            .ok_or_else(|| UnknownTestDefinition {
                def_name: def_name.to_string(),
                run_name: self.name.clone(),
            })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectRunError {
    #[error("no suite runs found")]
    NoRunsFound,
    #[error("no suite run has completed yet")]
    NoCompletedRun,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no result for test definition `{def_name}` in suite run `{run_name}`")]
pub struct UnknownTestDefinition {
    pub def_name: String,
    pub run_name: String,
}

/// Returns the run with the greatest completion time among completed runs.
///
/// Ties resolve to whichever run appears first in the input; runs still in
/// progress are skipped. An empty snapshot is `NoRunsFound`, a snapshot where
/// nothing has finished yet is `NoCompletedRun`.
pub fn select_newest_completed(runs: &[SuiteRun]) -> Result<&SuiteRun, SelectRunError> {
    if runs.is_empty() {
        return Err(SelectRunError::NoRunsFound);
    }

    let mut newest: Option<&SuiteRun> = None;
    for run in runs {
        let Some(completed) = run.completion_time else {
            continue;
        };
        match newest.and_then(|best| best.completion_time) {
            // Strictly-greater comparison keeps the first run on exact ties.
            Some(best) if completed <= best => {}
            _ => newest = Some(run),
        }
    }

    newest.ok_or(SelectRunError::NoCompletedRun)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn run(name: &str, completed_at: Option<i64>) -> SuiteRun {
        SuiteRun {
            name: name.to_string(),
            completion_time: completed_at
                .map(|seconds| Utc.timestamp_opt(seconds, 0).single().expect("timestamp")),
            results: Vec::new(),
        }
    }

    #[test]
    fn selects_run_with_greatest_completion_time() {
        let runs = vec![run("old", Some(100)), run("newest", Some(300)), run("mid", Some(200))];
        let selected = select_newest_completed(&runs).expect("selection");
        assert_eq!(selected.name, "newest");
    }

    #[test]
    fn skips_runs_still_in_progress() {
        let runs = vec![run("pending", None), run("done", Some(50))];
        let selected = select_newest_completed(&runs).expect("selection");
        assert_eq!(selected.name, "done");
    }

    #[test]
    fn first_run_wins_on_exact_tie() {
        let runs = vec![run("first", Some(700)), run("second", Some(700))];
        let selected = select_newest_completed(&runs).expect("selection");
        assert_eq!(selected.name, "first");
    }

    #[test]
    fn empty_snapshot_is_no_runs_found() {
        assert_eq!(select_newest_completed(&[]), Err(SelectRunError::NoRunsFound));
    }

    #[test]
    fn all_pending_snapshot_is_no_completed_run() {
        let runs = vec![run("a", None), run("b", None)];
        assert_eq!(
            select_newest_completed(&runs),
            Err(SelectRunError::NoCompletedRun)
        );
    }

    #[test]
    fn result_status_finds_named_definition() {
        let mut suite = run("r1", Some(1));
        suite.results = vec![
            TestResult {
                name: "api-tests".to_string(),
                status: TestStatus::Succeeded,
            },
            TestResult {
                name: "ui-tests".to_string(),
                status: TestStatus::Failed,
            },
        ];
        assert_eq!(suite.result_status("ui-tests"), Ok(TestStatus::Failed));
    }

    #[test]
    fn result_status_reports_unknown_definition() {
        let suite = run("r1", Some(1));
        let error = suite.result_status("missing").expect_err("missing result");
        assert_eq!(error.def_name, "missing");
        assert_eq!(error.run_name, "r1");
    }

    #[test]
    fn unexpected_status_strings_decode_to_unknown() {
        let result: TestResult =
            serde_json::from_str(r#"{"name":"t1","status":"exploded"}"#).expect("decode");
        assert_eq!(result.status, TestStatus::Unknown);
    }
}
