//! The aggregated outcome of one pipeline run.

use crate::diagnostic::{Diagnostic, Stage};
use crate::document::Document;
use crate::stage::Scalar;
use crate::state::{FatalClass, PipelineState};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const EXIT_COMPLETED: i32 = 0;
/// Used only under strict mode, when non-fatal failures were recorded.
pub const EXIT_COMPLETED_WITH_FAILURES: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub diagnostics: Vec<Diagnostic>,
}

impl StageReport {
    pub fn new(stage: Stage, outcome: StageOutcome, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            stage,
            outcome,
            diagnostics,
        }
    }

    pub fn skipped(stage: Stage) -> Self {
        Self::new(stage, StageOutcome::Skipped, Vec::new())
    }

    pub fn executed(&self) -> bool {
        self.outcome != StageOutcome::Skipped
    }
}

/// Run classification, ordered from best to worst.
///
/// `Aborted` outranks `CompletedWithFailures`, which outranks `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithFailures,
    Aborted { class: FatalClass },
}

impl RunStatus {
    pub fn severity_rank(self) -> u8 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::CompletedWithFailures => 1,
            RunStatus::Aborted { .. } => 2,
        }
    }

    /// The more severe of two statuses.
    pub fn worst(self, other: RunStatus) -> RunStatus {
        self.max(other)
    }

    /// Process exit code. Non-fatal failures exit 0 unless `strict`.
    pub fn exit_code(self, strict: bool) -> i32 {
        match self {
            RunStatus::Completed => EXIT_COMPLETED,
            RunStatus::CompletedWithFailures if strict => EXIT_COMPLETED_WITH_FAILURES,
            RunStatus::CompletedWithFailures => EXIT_COMPLETED,
            RunStatus::Aborted { class } => class.exit_code(),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => f.write_str("completed"),
            RunStatus::CompletedWithFailures => f.write_str("completed with failures"),
            RunStatus::Aborted { class } => write!(f, "aborted ({class})"),
        }
    }
}

/// Whether re-encoding reproduced the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum RoundTrip {
    /// A transform ran or encoding never happened.
    NotApplicable,
    Identical,
    #[serde(rename_all = "camelCase")]
    Mismatch { first_difference: usize },
}

impl RoundTrip {
    pub fn compare(original: &[u8], encoded: &[u8]) -> RoundTrip {
        match original.iter().zip(encoded).position(|(a, b)| a != b) {
            Some(offset) => RoundTrip::Mismatch {
                first_difference: offset,
            },
            None if original.len() == encoded.len() => RoundTrip::Identical,
            None => RoundTrip::Mismatch {
                first_difference: original.len().min(encoded.len()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub status: RunStatus,
    pub final_state: PipelineState,
    /// Every state entered, starting with `Compiling`.
    pub trace: Vec<PipelineState>,
    /// One report per stage, in run order.
    pub stages: Vec<StageReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_value: Option<Scalar>,
    pub round_trip: RoundTrip,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformed: Option<Document>,
    #[serde(skip)]
    pub output: Option<Vec<u8>>,
}

impl PipelineResult {
    /// The report for `stage`, if the result carries one. Results built by
    /// the pipeline always do; deserialized ones may not.
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }

    pub fn executed(&self, stage: Stage) -> bool {
        self.stage(stage).is_some_and(StageReport::executed)
    }

    /// All diagnostics in run order.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.stages.iter().flat_map(|report| report.diagnostics.iter())
    }

    pub fn diagnostics_for(&self, stage: Stage) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics().filter(move |d| d.stage == stage)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics().filter(|d| d.is_error()).count()
    }

    pub fn exit_code(&self, strict: bool) -> i32 {
        self.status.exit_code(strict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ranking_is_total_and_reproducible() {
        let completed = RunStatus::Completed;
        let failures = RunStatus::CompletedWithFailures;
        let aborted = RunStatus::Aborted {
            class: FatalClass::Decode,
        };

        assert!(completed < failures);
        assert!(failures < aborted);
        assert_eq!(completed.worst(aborted), aborted);
        assert_eq!(failures.worst(completed), failures);
        assert_eq!(
            [completed, failures, aborted].map(RunStatus::severity_rank),
            [0, 1, 2]
        );
    }

    #[test]
    fn stage_lookup_tolerates_partial_results() {
        let result: PipelineResult = serde_json::from_str(
            r#"{
                "status": {"kind": "aborted", "class": "decode"},
                "finalState": "aborted",
                "trace": ["compiling", "decoding", "aborted"],
                "stages": [{"stage": "decode", "outcome": "failed", "diagnostics": []}],
                "roundTrip": {"verdict": "not_applicable"}
            }"#,
        )
        .unwrap();

        assert_eq!(
            result.stage(Stage::Decode).map(|report| report.outcome),
            Some(StageOutcome::Failed)
        );
        assert!(result.stage(Stage::Encode).is_none());
        assert!(result.executed(Stage::Decode));
        assert!(!result.executed(Stage::Encode));
    }

    #[test]
    fn exit_codes_ignore_non_fatal_failures_unless_strict() {
        assert_eq!(RunStatus::Completed.exit_code(true), 0);
        assert_eq!(RunStatus::CompletedWithFailures.exit_code(false), 0);
        assert_eq!(RunStatus::CompletedWithFailures.exit_code(true), 5);
        assert_eq!(
            RunStatus::Aborted {
                class: FatalClass::Encode
            }
            .exit_code(false),
            4
        );
    }

    #[test]
    fn round_trip_compare_finds_first_difference() {
        assert_eq!(RoundTrip::compare(b"abc", b"abc"), RoundTrip::Identical);
        assert_eq!(
            RoundTrip::compare(b"abc", b"abd"),
            RoundTrip::Mismatch {
                first_difference: 2
            }
        );
        assert_eq!(
            RoundTrip::compare(b"ab", b"abc"),
            RoundTrip::Mismatch {
                first_difference: 2
            }
        );
    }

    #[test]
    fn status_serializes_with_kind_tag() {
        let json = serde_json::to_value(RunStatus::Aborted {
            class: FatalClass::Transform,
        })
        .unwrap();
        assert_eq!(json["kind"], "aborted");
        assert_eq!(json["class"], "transform");
    }
}
