//! Integration tests: the orchestrator's error policy against stub engines.
//!
//! The stub format treats data as newline-terminated words under a `words`
//! root. Schema files steer it: a schema containing `broken` fails to
//! compile, one containing `decode-only` refuses to encode. Bytes 0xFF in the
//! input are a decode error.

use interlace_kernel::{
    ConfigurationError, DataFormat, Diagnostic, DiagnosticList, Document, Element, FailureClass,
    FatalClass, NamespaceBindings, Pipeline, PipelineOptions, PipelinePlan, PipelineState,
    Produced, QName, QueryEngine, QueryError, QuerySpec, RoundTrip, RuleValidator, RunStatus,
    PipelineResult, Scalar, Stage, StageOutcome, StageReport, StructuralValidator,
    TransformEngine, TransformError, ValidationReport,
};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

fn report(result: &PipelineResult, stage: Stage) -> &StageReport {
    result.stage(stage).expect("every stage is reported")
}

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "interlace-kernel-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path.join(name);
        fs::write(&path, contents).expect("fixture should be written");
        path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

// ---------------------------------------------------------------------------
// Stub engines
// ---------------------------------------------------------------------------

struct WordsSchema {
    unparseable: bool,
}

#[derive(Default)]
struct WordsFormat {
    parses: AtomicUsize,
    unparses: AtomicUsize,
}

impl DataFormat for WordsFormat {
    type Compiled = WordsSchema;

    fn name(&self) -> &str {
        "words"
    }

    fn compile(&self, path: &Path) -> Result<Produced<WordsSchema>, DiagnosticList> {
        let text = fs::read_to_string(path).map_err(|e| {
            vec![Diagnostic::error(
                Stage::Compile,
                FailureClass::Io,
                e.to_string(),
            )]
        })?;
        if text.contains("broken") {
            return Err(vec![Diagnostic::error(
                Stage::Compile,
                FailureClass::SchemaCompile,
                "schema is broken",
            )]);
        }
        Ok(Produced::clean(WordsSchema {
            unparseable: text.contains("decode-only"),
        }))
    }

    fn parse(
        &self,
        _compiled: &WordsSchema,
        input: &mut dyn Read,
    ) -> Result<Produced<Document>, DiagnosticList> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes).map_err(|e| {
            vec![Diagnostic::error(
                Stage::Decode,
                FailureClass::Io,
                e.to_string(),
            )]
        })?;
        if let Some(offset) = bytes.iter().position(|b| *b == 0xFF) {
            return Err(vec![
                Diagnostic::error(Stage::Decode, FailureClass::Decode, "invalid byte")
                    .with_location(format!("offset {offset}")),
            ]);
        }
        let text = String::from_utf8_lossy(&bytes);
        let mut root = Element::new(QName::local("words"));
        for word in text.split_terminator('\n') {
            root = root.with_child(Element::leaf(QName::local("word"), word));
        }
        Ok(Produced::clean(Document::new(root)))
    }

    fn unparse(
        &self,
        compiled: &WordsSchema,
        document: &Document,
    ) -> Result<Produced<Vec<u8>>, DiagnosticList> {
        self.unparses.fetch_add(1, Ordering::SeqCst);
        if compiled.unparseable {
            return Err(vec![Diagnostic::error(
                Stage::Encode,
                FailureClass::SchemaNotUnparseable,
                "schema does not support encoding",
            )]);
        }
        let mut out = Vec::new();
        for word in document.root().child_elements() {
            out.extend_from_slice(word.text().as_bytes());
            out.push(b'\n');
        }
        Ok(Produced::clean(out))
    }
}

/// Fails with one violation per word beyond `max_words`.
struct MaxWords {
    max_words: usize,
    calls: AtomicUsize,
}

impl MaxWords {
    fn new(max_words: usize) -> Self {
        Self {
            max_words,
            calls: AtomicUsize::new(0),
        }
    }
}

impl StructuralValidator for MaxWords {
    fn validate_structure(
        &self,
        schema_def: &Path,
        document: &Document,
    ) -> Result<ValidationReport, ConfigurationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if schema_def.to_string_lossy().contains("malformed") {
            return Err(ConfigurationError::InvalidSchemaDefinition {
                path: schema_def.to_path_buf(),
                cause: "not a schema".to_string(),
            });
        }
        let diags = document
            .root()
            .child_elements()
            .skip(self.max_words)
            .map(|word| {
                Diagnostic::error(
                    Stage::StructuralValidation,
                    FailureClass::StructuralViolation,
                    format!("unexpected word `{}`", word.text()),
                )
            })
            .collect();
        Ok(ValidationReport::from_diagnostics(diags))
    }
}

/// Fails once per word equal to `forbidden`.
struct ForbiddenWord {
    forbidden: &'static str,
    calls: AtomicUsize,
}

impl ForbiddenWord {
    fn new(forbidden: &'static str) -> Self {
        Self {
            forbidden,
            calls: AtomicUsize::new(0),
        }
    }
}

impl RuleValidator for ForbiddenWord {
    fn validate_rules(
        &self,
        _rule_file: &Path,
        document: &Document,
    ) -> Result<ValidationReport, ConfigurationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let diags = document
            .root()
            .child_elements()
            .filter(|word| word.text() == self.forbidden)
            .map(|_| {
                // Engines may attribute findings loosely; the kernel restages.
                Diagnostic::error(
                    Stage::StructuralValidation,
                    FailureClass::RuleViolation,
                    format!("`{}` is forbidden", self.forbidden),
                )
                .with_rule_id("forbidden-word")
            })
            .collect();
        Ok(ValidationReport::from_diagnostics(diags))
    }
}

/// Answers `word[N]` with the N-th word; `tns:` needs a binding.
#[derive(Default)]
struct NthWord {
    calls: AtomicUsize,
}

impl QueryEngine for NthWord {
    fn query(
        &self,
        document: &Document,
        expression: &str,
        namespaces: &NamespaceBindings,
    ) -> Result<Scalar, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if expression.starts_with("tns:") && namespaces.resolve("tns").is_none() {
            return Err(QueryError::UnboundNamespacePrefix {
                prefix: "tns".to_string(),
            });
        }
        let index: usize = expression
            .trim_start_matches("tns:")
            .trim_start_matches("word[")
            .trim_end_matches(']')
            .parse()
            .map_err(|_| QueryError::Syntax {
                expression: expression.to_string(),
                message: "expected word[N]".to_string(),
            })?;
        let text = document
            .root()
            .child_elements()
            .nth(index.saturating_sub(1))
            .map(|word| word.text())
            .unwrap_or_default();
        Ok(Scalar::Text(text))
    }
}

/// Upper-cases every word; a definition path containing `fail` errors.
#[derive(Default)]
struct Shout {
    calls: AtomicUsize,
}

impl TransformEngine for Shout {
    fn transform(&self, document: &Document, def: &Path) -> Result<Document, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if def.to_string_lossy().contains("fail") {
            return Err(TransformError::Execution("cannot shout".to_string()));
        }
        let mut out = document.clone();
        for child in out.root.children.iter_mut() {
            if let Some(word) = child.as_element_mut() {
                let upper = word.text().to_uppercase();
                word.set_text(upper);
            }
        }
        Ok(out)
    }
}

struct Engines {
    format: WordsFormat,
    structural: MaxWords,
    rules: ForbiddenWord,
    query: NthWord,
    transform: Shout,
}

impl Engines {
    fn new(max_words: usize) -> Self {
        Self {
            format: WordsFormat::default(),
            structural: MaxWords::new(max_words),
            rules: ForbiddenWord::new("Third"),
            query: NthWord::default(),
            transform: Shout::default(),
        }
    }

    fn pipeline(&self) -> Pipeline<'_, WordsFormat> {
        Pipeline::new(&self.format)
            .with_structural_validator(&self.structural)
            .with_rule_validator(&self.rules)
            .with_query_engine(&self.query)
            .with_transform_engine(&self.transform)
    }
}

fn full_plan(dir: &TempDirGuard) -> PipelinePlan {
    PipelinePlan::new(dir.write("words.schema", "words"))
        .with_rules(dir.write("words.rules", "rules"))
        .with_query(QuerySpec::new("word[2]"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn clean_run_completes_and_round_trips() {
    let dir = TempDirGuard::new("clean");
    let engines = Engines::new(10);
    let input = b"Hello\nWorld\n";

    let result = engines.pipeline().run(&full_plan(&dir), &mut &input[..]);

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.final_state, PipelineState::Done);
    assert_eq!(
        result.trace,
        vec![
            PipelineState::Compiling,
            PipelineState::Decoding,
            PipelineState::Validating,
            PipelineState::Querying,
            PipelineState::Transforming,
            PipelineState::Encoding,
            PipelineState::Done,
        ]
    );
    assert_eq!(result.query_value, Some(Scalar::Text("World".to_string())));
    assert_eq!(result.round_trip, RoundTrip::Identical);
    assert_eq!(result.output.as_deref(), Some(&input[..]));
    assert_eq!(report(&result, Stage::Transform).outcome, StageOutcome::Skipped);
    assert_eq!(result.exit_code(false), 0);
    assert!(result.schema_digest.as_deref().unwrap().starts_with("sha256:"));
}

#[test]
fn decode_failure_stops_every_later_stage() {
    let dir = TempDirGuard::new("decode");
    let engines = Engines::new(10);
    let plan = full_plan(&dir).with_transform(dir.write("shout.xform", "shout"));
    let input = [b'H', b'i', b'\n', 0xFF];

    let result = engines.pipeline().run(&plan, &mut &input[..]);

    assert_eq!(
        result.status,
        RunStatus::Aborted {
            class: FatalClass::Decode
        }
    );
    assert_eq!(result.final_state, PipelineState::Aborted);
    assert_eq!(result.exit_code(false), 2);
    for stage in [
        Stage::StructuralValidation,
        Stage::RuleValidation,
        Stage::Query,
        Stage::Transform,
        Stage::Encode,
    ] {
        assert!(!result.executed(stage), "{stage} must not run after decode failure");
    }
    assert_eq!(engines.structural.calls.load(Ordering::SeqCst), 0);
    assert_eq!(engines.rules.calls.load(Ordering::SeqCst), 0);
    assert_eq!(engines.query.calls.load(Ordering::SeqCst), 0);
    assert_eq!(engines.transform.calls.load(Ordering::SeqCst), 0);
    assert_eq!(engines.format.unparses.load(Ordering::SeqCst), 0);

    let decode_diags: Vec<_> = result.diagnostics_for(Stage::Decode).collect();
    assert_eq!(decode_diags.len(), 1);
    assert_eq!(decode_diags[0].location.as_deref(), Some("offset 3"));
    assert!(result.decoded.is_none());
}

#[test]
fn compile_failure_aborts_before_decoding() {
    let dir = TempDirGuard::new("compile");
    let engines = Engines::new(10);
    let plan = PipelinePlan::new(dir.write("bad.schema", "broken"));

    let result = engines.pipeline().run(&plan, &mut &b"Hello\n"[..]);

    assert_eq!(
        result.status,
        RunStatus::Aborted {
            class: FatalClass::SchemaCompile
        }
    );
    assert_eq!(result.exit_code(false), 1);
    assert_eq!(engines.format.parses.load(Ordering::SeqCst), 0);
    assert_eq!(result.trace, vec![PipelineState::Compiling, PipelineState::Aborted]);
    assert!(result.schema_digest.is_none());
}

#[test]
fn validation_failures_do_not_stop_later_stages() {
    let dir = TempDirGuard::new("validation");
    let engines = Engines::new(2);
    let plan = full_plan(&dir).with_transform(dir.write("shout.xform", "shout"));

    let result = engines
        .pipeline()
        .run(&plan, &mut &b"Hello\nWorld\nThird\n"[..]);

    assert_eq!(result.status, RunStatus::CompletedWithFailures);
    assert_eq!(result.final_state, PipelineState::Done);
    assert_eq!(result.exit_code(false), 0);
    assert_eq!(result.exit_code(true), 5);

    assert_eq!(
        report(&result, Stage::StructuralValidation).outcome,
        StageOutcome::Failed
    );
    assert_eq!(report(&result, Stage::RuleValidation).outcome, StageOutcome::Failed);
    assert!(result.executed(Stage::Query));
    assert!(result.executed(Stage::Transform));
    assert!(result.executed(Stage::Encode));
    assert_eq!(result.output.as_deref(), Some(&b"HELLO\nWORLD\nTHIRD\n"[..]));
    assert_eq!(result.round_trip, RoundTrip::NotApplicable);

    // Both validators ran exactly once, and their findings stay separable.
    assert_eq!(engines.structural.calls.load(Ordering::SeqCst), 1);
    assert_eq!(engines.rules.calls.load(Ordering::SeqCst), 1);
    let structural: Vec<_> = result.diagnostics_for(Stage::StructuralValidation).collect();
    let rules: Vec<_> = result.diagnostics_for(Stage::RuleValidation).collect();
    assert_eq!(structural.len(), 1);
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].class, FailureClass::RuleViolation);
    assert_eq!(rules[0].rule_id.as_deref(), Some("forbidden-word"));

    // The pre-transform document is still available.
    let decoded = result.decoded.as_ref().unwrap();
    assert_eq!(decoded.root().child_elements().next().unwrap().text(), "Hello");
    let transformed = result.transformed.as_ref().unwrap();
    assert_eq!(transformed.root().child_elements().next().unwrap().text(), "HELLO");
}

#[test]
fn malformed_structural_definition_is_a_configuration_failure() {
    let dir = TempDirGuard::new("config");
    let engines = Engines::new(10);
    let plan = full_plan(&dir).with_structural_schema(dir.write("malformed.xsd", "x"));

    let result = engines.pipeline().run(&plan, &mut &b"Hello\nWorld\n"[..]);

    let structural = report(&result, Stage::StructuralValidation);
    assert_eq!(structural.outcome, StageOutcome::Failed);
    assert_eq!(structural.diagnostics.len(), 1);
    assert_eq!(structural.diagnostics[0].class, FailureClass::Configuration);
    assert!(structural.diagnostics[0].location.as_deref().unwrap().ends_with("malformed.xsd"));

    // Non-fatal: the rule validator and everything after still ran.
    assert_eq!(report(&result, Stage::RuleValidation).outcome, StageOutcome::Success);
    assert_eq!(result.status, RunStatus::CompletedWithFailures);
    assert_eq!(result.final_state, PipelineState::Done);
}

#[test]
fn empty_query_result_policy_is_caller_controlled() {
    let dir = TempDirGuard::new("query");
    let engines = Engines::new(10);
    let strict_plan = full_plan(&dir).with_query(QuerySpec::new("word[5]"));

    let result = engines.pipeline().run(&strict_plan, &mut &b"Hello\nWorld\n"[..]);
    let query = report(&result, Stage::Query);
    assert_eq!(query.outcome, StageOutcome::Failed);
    assert_eq!(query.diagnostics[0].class, FailureClass::EmptyQueryResult);
    assert_eq!(result.query_value, None);
    assert!(result.executed(Stage::Encode));
    assert_eq!(result.status, RunStatus::CompletedWithFailures);

    let lenient_plan =
        full_plan(&dir).with_query(QuerySpec::new("word[5]").allowing_empty(true));
    let result = engines.pipeline().run(&lenient_plan, &mut &b"Hello\nWorld\n"[..]);
    assert_eq!(report(&result, Stage::Query).outcome, StageOutcome::Success);
    assert_eq!(result.query_value, Some(Scalar::Text(String::new())));
    assert_eq!(result.status, RunStatus::Completed);
}

#[test]
fn unbound_prefix_is_classified() {
    let dir = TempDirGuard::new("prefix");
    let engines = Engines::new(10);
    let plan = full_plan(&dir).with_query(QuerySpec::new("tns:word[1]"));

    let result = engines.pipeline().run(&plan, &mut &b"Hello\n"[..]);
    let diags: Vec<_> = result.diagnostics_for(Stage::Query).collect();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].class, FailureClass::UnboundNamespacePrefix);

    let bound = full_plan(&dir).with_query(QuerySpec::new("tns:word[1]").bind("tns", "urn:words"));
    let result = engines.pipeline().run(&bound, &mut &b"Hello\n"[..]);
    assert_eq!(result.query_value, Some(Scalar::Text("Hello".to_string())));
}

#[test]
fn transform_failure_aborts_before_encoding() {
    let dir = TempDirGuard::new("transform");
    let engines = Engines::new(10);
    let plan = full_plan(&dir).with_transform(dir.write("fail.xform", "x"));

    let result = engines.pipeline().run(&plan, &mut &b"Hello\nWorld\n"[..]);

    assert_eq!(
        result.status,
        RunStatus::Aborted {
            class: FatalClass::Transform
        }
    );
    assert_eq!(result.exit_code(false), 3);
    assert!(!result.executed(Stage::Encode));
    assert_eq!(engines.format.unparses.load(Ordering::SeqCst), 0);
    assert!(result.decoded.is_some());
    assert!(result.transformed.is_none());
}

#[test]
fn unparseable_schema_aborts_with_encode_class() {
    let dir = TempDirGuard::new("encode");
    let engines = Engines::new(10);
    let plan = PipelinePlan::new(dir.write("ro.schema", "decode-only"));

    let result = engines.pipeline().run(&plan, &mut &b"Hello\n"[..]);

    assert_eq!(
        result.status,
        RunStatus::Aborted {
            class: FatalClass::Encode
        }
    );
    assert_eq!(result.exit_code(false), 4);
    let diags: Vec<_> = result.diagnostics_for(Stage::Encode).collect();
    assert_eq!(diags[0].class, FailureClass::SchemaNotUnparseable);
    assert!(result.output.is_none());
}

#[test]
fn missing_validators_and_query_are_skipped() {
    let dir = TempDirGuard::new("skipped");
    let engines = Engines::new(10);
    let plan = PipelinePlan::new(dir.write("words.schema", "words")).without_structural_validation();

    let result = engines.pipeline().run(&plan, &mut &b"Hello\n"[..]);

    assert_eq!(result.status, RunStatus::Completed);
    for stage in [
        Stage::StructuralValidation,
        Stage::RuleValidation,
        Stage::Query,
        Stage::Transform,
    ] {
        assert_eq!(report(&result, stage).outcome, StageOutcome::Skipped);
    }
    assert_eq!(engines.structural.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn requested_stage_without_engine_is_a_configuration_failure() {
    let dir = TempDirGuard::new("no-engine");
    let format = WordsFormat::default();
    let plan = full_plan(&dir);

    let result = Pipeline::new(&format).run(&plan, &mut &b"Hello\nWorld\n"[..]);

    for stage in [Stage::StructuralValidation, Stage::RuleValidation, Stage::Query] {
        let stage_report = report(&result, stage);
        assert_eq!(stage_report.outcome, StageOutcome::Failed, "{stage}");
        assert_eq!(stage_report.diagnostics[0].class, FailureClass::Configuration);
    }
    assert_eq!(result.status, RunStatus::CompletedWithFailures);
}

#[test]
fn parallel_validation_matches_sequential() {
    let dir = TempDirGuard::new("parallel");
    let input = b"Hello\nWorld\nThird\n";
    let sequential_engines = Engines::new(2);
    let parallel_engines = Engines::new(2);
    let plan = full_plan(&dir);
    let parallel_plan = plan.clone().with_options(PipelineOptions {
        parallel_validation: true,
    });

    let sequential = sequential_engines.pipeline().run(&plan, &mut &input[..]);
    let parallel = parallel_engines.pipeline().run(&parallel_plan, &mut &input[..]);

    assert_eq!(sequential, parallel);
    assert_eq!(parallel_engines.structural.calls.load(Ordering::SeqCst), 1);
    assert_eq!(parallel_engines.rules.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_data_file_is_a_decode_failure() {
    let dir = TempDirGuard::new("no-data");
    let engines = Engines::new(10);
    let plan = full_plan(&dir).with_data(dir.path.join("absent.dat"));

    let result = engines.pipeline().run_plan(&plan);

    assert_eq!(
        result.status,
        RunStatus::Aborted {
            class: FatalClass::Decode
        }
    );
    let diags: Vec<_> = result.diagnostics_for(Stage::Decode).collect();
    assert_eq!(diags[0].class, FailureClass::Io);
    assert!(result.executed(Stage::Compile));
}

#[test]
fn round_trip_mismatch_is_a_warning() {
    let dir = TempDirGuard::new("mismatch");
    let engines = Engines::new(10);
    let plan = PipelinePlan::new(dir.write("words.schema", "words"));

    // The stub always writes a final newline.
    let result = engines.pipeline().run(&plan, &mut &b"Hello\nWorld"[..]);

    assert_eq!(
        result.round_trip,
        RoundTrip::Mismatch {
            first_difference: 11
        }
    );
    let encode = report(&result, Stage::Encode);
    assert_eq!(encode.outcome, StageOutcome::Success);
    assert_eq!(encode.diagnostics.len(), 1);
    assert_eq!(encode.diagnostics[0].class, FailureClass::RoundTripMismatch);
    assert!(!encode.diagnostics[0].is_error());
    assert_eq!(result.status, RunStatus::Completed);
}

#[test]
fn diagnostics_are_preserved_in_run_order() {
    let dir = TempDirGuard::new("order");
    let engines = Engines::new(1);
    let plan = full_plan(&dir).with_query(QuerySpec::new("word[9]"));

    let result = engines
        .pipeline()
        .run(&plan, &mut &b"Hello\nWorld\nThird\n"[..]);

    let stages: Vec<Stage> = result.diagnostics().map(|d| d.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::StructuralValidation,
            Stage::StructuralValidation,
            Stage::RuleValidation,
            Stage::Query,
        ]
    );
    assert_eq!(result.error_count(), 4);
}
