//! Pipeline orchestrator.
//!
//! The orchestrator owns every error-policy decision: which failures end the
//! run, which are merely recorded, and what the run's final status is. Engines
//! only report.
//!
//! Policy:
//! - compile, decode, transform, encode errors abort; later stages are Skipped
//! - both validators always run once a document exists, even if one fails
//! - a query failure is recorded and the run continues on the same document
//! - with no transform configured the decoded document is re-encoded and the
//!   bytes are compared with the input

use crate::diagnostic::{Diagnostic, DiagnosticList, FailureClass, Stage, has_errors};
use crate::document::Document;
use crate::error::{ConfigurationError, QueryError, TransformError};
use crate::plan::PipelinePlan;
use crate::result::{PipelineResult, RoundTrip, RunStatus, StageOutcome, StageReport};
use crate::schema::{self, SchemaHandle};
use crate::stage::{
    DataFormat, QueryEngine, RuleValidator, Scalar, StructuralValidator, TransformEngine,
    ValidationReport,
};
use crate::state::{FatalClass, PipelineState, StepVerdict};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

type SharedStructural<'a> = &'a (dyn StructuralValidator + Sync);
type SharedRules<'a> = &'a (dyn RuleValidator + Sync);

/// A set of engines ready to execute plans.
///
/// Engines are borrowed; one `Pipeline` can execute any number of runs, and
/// runs share no mutable state.
pub struct Pipeline<'a, F: DataFormat> {
    format: &'a F,
    structural: Option<SharedStructural<'a>>,
    rules: Option<SharedRules<'a>>,
    query: Option<&'a dyn QueryEngine>,
    transform: Option<&'a dyn TransformEngine>,
}

impl<'a, F: DataFormat> Pipeline<'a, F> {
    pub fn new(format: &'a F) -> Self {
        Self {
            format,
            structural: None,
            rules: None,
            query: None,
            transform: None,
        }
    }

    pub fn with_structural_validator(mut self, engine: SharedStructural<'a>) -> Self {
        self.structural = Some(engine);
        self
    }

    pub fn with_rule_validator(mut self, engine: SharedRules<'a>) -> Self {
        self.rules = Some(engine);
        self
    }

    pub fn with_query_engine(mut self, engine: &'a dyn QueryEngine) -> Self {
        self.query = Some(engine);
        self
    }

    pub fn with_transform_engine(mut self, engine: &'a dyn TransformEngine) -> Self {
        self.transform = Some(engine);
        self
    }

    /// Execute `plan`, reading input from `plan.data`.
    ///
    /// An unreadable data file is a decode-class failure, reported after the
    /// schema has compiled.
    pub fn run_plan(&self, plan: &PipelinePlan) -> PipelineResult {
        let Some(data) = plan.data.as_deref() else {
            let mut missing = UnavailableInput::new(io::ErrorKind::NotFound, "plan names no data file");
            return self.run(plan, &mut missing);
        };
        match File::open(data) {
            Ok(file) => self.run(plan, &mut BufReader::new(file)),
            Err(err) => {
                let mut missing = UnavailableInput::new(err.kind(), err.to_string());
                self.run(plan, &mut missing)
            }
        }
    }

    /// Execute `plan` against bytes read from `input`.
    pub fn run(&self, plan: &PipelinePlan, input: &mut dyn Read) -> PipelineResult {
        let mut run = Run::new();

        // Compiling
        info!(stage = %Stage::Compile, schema = %plan.schema.display(), "compiling schema");
        let handle = match SchemaHandle::compile(self.format, &plan.schema) {
            Ok(produced) => {
                run.record(Stage::Compile, produced.warnings);
                produced.value
            }
            Err(diags) => {
                run.record(Stage::Compile, diags);
                return run.finish();
            }
        };
        run.schema_digest = Some(handle.digest().to_string());

        // Decoding
        let mut input_bytes = Vec::new();
        if let Err(err) = input.read_to_end(&mut input_bytes) {
            run.fail_input(format!("cannot read input: {err}"), plan.data.as_deref());
            return run.finish();
        }
        info!(stage = %Stage::Decode, bytes = input_bytes.len(), "decoding");
        let decoded = {
            let mut cursor: &[u8] = &input_bytes;
            match schema::decode(self.format, &handle, &mut cursor) {
                Ok(produced) => {
                    run.record(Stage::Decode, produced.warnings);
                    produced.value
                }
                Err(diags) => {
                    run.record(Stage::Decode, diags);
                    return run.finish();
                }
            }
        };
        debug!(elements = decoded.element_count(), "document decoded");

        // Validating
        let (structural, rules) = self.validate(plan, &decoded);
        let validation_failed = structural.outcome == StageOutcome::Failed
            || rules.outcome == StageOutcome::Failed;
        run.push_report(structural);
        run.push_report(rules);
        run.advance(if validation_failed {
            StepVerdict::Failed
        } else {
            StepVerdict::Passed
        });

        // Querying
        let query_report = self.query_stage(plan, &decoded, &mut run.query_value);
        let verdict = verdict_of(&query_report);
        run.push_report(query_report);
        run.advance(verdict);

        // Transforming
        let transformed = match plan.transform.as_deref() {
            None => {
                run.push_report(StageReport::skipped(Stage::Transform));
                run.advance(StepVerdict::Passed);
                None
            }
            Some(def) => match self.transform_stage(def, &decoded) {
                Ok(document) => {
                    run.record(Stage::Transform, Vec::new());
                    Some(document)
                }
                Err(diags) => {
                    run.decoded = Some(decoded);
                    run.record(Stage::Transform, diags);
                    return run.finish();
                }
            },
        };

        // Encoding
        let to_encode = transformed.as_ref().unwrap_or(&decoded);
        info!(stage = %Stage::Encode, transformed = transformed.is_some(), "encoding");
        match schema::encode(self.format, &handle, to_encode) {
            Ok(produced) => {
                let mut diags = produced.warnings;
                if transformed.is_none() {
                    let verdict = RoundTrip::compare(&input_bytes, &produced.value);
                    if let RoundTrip::Mismatch { first_difference } = verdict {
                        warn!(first_difference, "round trip did not reproduce input");
                        diags.push(
                            Diagnostic::warning(
                                Stage::Encode,
                                FailureClass::RoundTripMismatch,
                                format!(
                                    "re-encoded data differs from input ({} bytes in, {} bytes out)",
                                    input_bytes.len(),
                                    produced.value.len()
                                ),
                            )
                            .with_location(format!("offset {first_difference}")),
                        );
                    }
                    run.round_trip = verdict;
                }
                run.output = Some(produced.value);
                run.record(Stage::Encode, diags);
            }
            Err(diags) => run.record(Stage::Encode, diags),
        }

        run.decoded = Some(decoded);
        run.transformed = transformed;
        run.finish()
    }

    fn validate(&self, plan: &PipelinePlan, document: &Document) -> (StageReport, StageReport) {
        let structural = self.structural;
        let rules = self.rules;
        if !plan.options.parallel_validation {
            return (
                structural_stage(structural, plan, document),
                rule_stage(rules, plan, document),
            );
        }

        debug!("running validators concurrently");
        std::thread::scope(|scope| {
            let structural_handle =
                scope.spawn(move || structural_stage(structural, plan, document));
            let rule_report = rule_stage(rules, plan, document);
            let structural_report = match structural_handle.join() {
                Ok(report) => report,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            (structural_report, rule_report)
        })
    }

    fn query_stage(
        &self,
        plan: &PipelinePlan,
        document: &Document,
        slot: &mut Option<Scalar>,
    ) -> StageReport {
        let Some(spec) = plan.query.as_ref() else {
            return StageReport::skipped(Stage::Query);
        };
        info!(stage = %Stage::Query, expression = %spec.expression, "querying");
        let Some(engine) = self.query else {
            return missing_engine(Stage::Query, "query engine");
        };

        let fail = |class: FailureClass, message: String| {
            StageReport::new(
                Stage::Query,
                StageOutcome::Failed,
                vec![Diagnostic::error(Stage::Query, class, message).with_rule_id(&spec.expression)],
            )
        };

        match engine.query(document, &spec.expression, &spec.namespaces) {
            Ok(value) if value.is_empty_text() && !spec.allow_empty => fail(
                FailureClass::EmptyQueryResult,
                "expression produced nothing".to_string(),
            ),
            Ok(value) => {
                debug!(value = %value, "query answered");
                *slot = Some(value);
                StageReport::new(Stage::Query, StageOutcome::Success, Vec::new())
            }
            Err(err @ QueryError::UnboundNamespacePrefix { .. }) => {
                fail(FailureClass::UnboundNamespacePrefix, err.to_string())
            }
            Err(err) => fail(FailureClass::QueryEvaluation, err.to_string()),
        }
    }

    fn transform_stage(&self, def: &Path, document: &Document) -> Result<Document, DiagnosticList> {
        info!(stage = %Stage::Transform, definition = %def.display(), "transforming");
        let Some(engine) = self.transform else {
            return Err(missing_engine(Stage::Transform, "transform engine").diagnostics);
        };
        engine.transform(document, def).map_err(|err| {
            let class = match err {
                TransformError::InvalidDefinition { .. } => FailureClass::Configuration,
                TransformError::Execution(_) => FailureClass::Transform,
            };
            vec![
                Diagnostic::error(Stage::Transform, class, err.to_string())
                    .with_location(def.display().to_string()),
            ]
        })
    }
}

fn structural_stage(
    engine: Option<SharedStructural<'_>>,
    plan: &PipelinePlan,
    document: &Document,
) -> StageReport {
    let Some(def) = plan.structural_definition() else {
        return StageReport::skipped(Stage::StructuralValidation);
    };
    info!(stage = %Stage::StructuralValidation, definition = %def.display(), "validating structure");
    let Some(engine) = engine else {
        return missing_engine(Stage::StructuralValidation, "structural validator");
    };
    validation_report(
        Stage::StructuralValidation,
        engine.validate_structure(def, document),
    )
}

fn rule_stage(engine: Option<SharedRules<'_>>, plan: &PipelinePlan, document: &Document) -> StageReport {
    let Some(def) = plan.rules.as_deref() else {
        return StageReport::skipped(Stage::RuleValidation);
    };
    info!(stage = %Stage::RuleValidation, definition = %def.display(), "validating rules");
    let Some(engine) = engine else {
        return missing_engine(Stage::RuleValidation, "rule validator");
    };
    validation_report(Stage::RuleValidation, engine.validate_rules(def, document))
}

fn validation_report(
    stage: Stage,
    result: Result<ValidationReport, ConfigurationError>,
) -> StageReport {
    match result {
        Ok(report) => {
            let failed = !report.valid || has_errors(&report.diagnostics);
            let diagnostics: DiagnosticList = report
                .diagnostics
                .into_iter()
                .map(|d| d.restaged(stage))
                .collect();
            if failed {
                warn!(stage = %stage, violations = diagnostics.len(), "document is not valid");
            }
            StageReport::new(
                stage,
                if failed {
                    StageOutcome::Failed
                } else {
                    StageOutcome::Success
                },
                diagnostics,
            )
        }
        Err(err) => {
            warn!(stage = %stage, error = %err, "validation not attempted");
            StageReport::new(
                stage,
                StageOutcome::Failed,
                ValidationReport::configuration_error(stage, &err).diagnostics,
            )
        }
    }
}

fn missing_engine(stage: Stage, what: &str) -> StageReport {
    StageReport::new(
        stage,
        StageOutcome::Failed,
        vec![Diagnostic::error(
            stage,
            FailureClass::Configuration,
            format!("plan requires a {what} but none is configured"),
        )],
    )
}

fn verdict_of(report: &StageReport) -> StepVerdict {
    match report.outcome {
        StageOutcome::Failed => StepVerdict::Failed,
        StageOutcome::Success | StageOutcome::Skipped => StepVerdict::Passed,
    }
}

/// Mutable bookkeeping for one run; frozen into a [`PipelineResult`].
struct Run {
    state: PipelineState,
    trace: Vec<PipelineState>,
    reports: Vec<StageReport>,
    schema_digest: Option<String>,
    query_value: Option<Scalar>,
    round_trip: RoundTrip,
    decoded: Option<Document>,
    transformed: Option<Document>,
    output: Option<Vec<u8>>,
    aborted_in: Option<FatalClass>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: PipelineState::Compiling,
            trace: vec![PipelineState::Compiling],
            reports: Vec::with_capacity(Stage::ALL.len()),
            schema_digest: None,
            query_value: None,
            round_trip: RoundTrip::NotApplicable,
            decoded: None,
            transformed: None,
            output: None,
            aborted_in: None,
        }
    }

    fn advance(&mut self, verdict: StepVerdict) {
        let next = self.state.next(verdict);
        if next == PipelineState::Aborted && self.aborted_in.is_none() {
            self.aborted_in = self.state.fatal_class();
        }
        if next != self.state {
            debug!(from = %self.state, to = %next, "state transition");
            self.state = next;
            self.trace.push(next);
        }
    }

    fn push_report(&mut self, report: StageReport) {
        self.reports.push(report);
    }

    /// Record a single-stage step and advance the machine on its verdict.
    fn record(&mut self, stage: Stage, diagnostics: DiagnosticList) {
        let failed = has_errors(&diagnostics);
        if failed {
            warn!(stage = %stage, errors = diagnostics.iter().filter(|d| d.is_error()).count(), "stage failed");
        }
        self.reports.push(StageReport::new(
            stage,
            if failed {
                StageOutcome::Failed
            } else {
                StageOutcome::Success
            },
            diagnostics,
        ));
        self.advance(if failed {
            StepVerdict::Failed
        } else {
            StepVerdict::Passed
        });
    }

    /// Input could not be obtained: a decode-class failure.
    fn fail_input(&mut self, message: impl Into<String>, path: Option<&Path>) {
        let mut diag = Diagnostic::error(Stage::Decode, FailureClass::Io, message);
        if let Some(path) = path {
            diag = diag.with_location(path.display().to_string());
        }
        self.record(Stage::Decode, vec![diag]);
    }

    fn finish(mut self) -> PipelineResult {
        for stage in Stage::ALL.iter().skip(self.reports.len()) {
            self.reports.push(StageReport::skipped(*stage));
        }

        let mut status = RunStatus::Completed;
        if self
            .reports
            .iter()
            .any(|report| report.outcome == StageOutcome::Failed)
        {
            status = status.worst(RunStatus::CompletedWithFailures);
        }
        if let Some(class) = self.aborted_in {
            status = status.worst(RunStatus::Aborted { class });
        }
        info!(status = %status, state = %self.state, "pipeline finished");

        PipelineResult {
            status,
            final_state: self.state,
            trace: self.trace,
            stages: self.reports,
            schema_digest: self.schema_digest,
            query_value: self.query_value,
            round_trip: self.round_trip,
            decoded: self.decoded,
            transformed: self.transformed,
            output: self.output,
        }
    }
}

/// A reader standing in for input that could not be opened.
struct UnavailableInput {
    kind: io::ErrorKind,
    message: String,
}

impl UnavailableInput {
    fn new(kind: io::ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Read for UnavailableInput {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(self.kind, self.message.clone()))
    }
}
