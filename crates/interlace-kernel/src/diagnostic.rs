//! Diagnostics: the single currency every stage reports in.
//!
//! A diagnostic is immutable once built. It always names the [`Stage`] that
//! produced it, so a consumer can select "only structural-validation findings"
//! from a mixed run without parsing message text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Pipeline stage that produced a diagnostic.
///
/// Declaration order is run order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Compile,
    Decode,
    StructuralValidation,
    RuleValidation,
    Query,
    Transform,
    Encode,
}

impl Stage {
    /// Every stage in run order.
    pub const ALL: [Stage; 7] = [
        Stage::Compile,
        Stage::Decode,
        Stage::StructuralValidation,
        Stage::RuleValidation,
        Stage::Query,
        Stage::Transform,
        Stage::Encode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Compile => "compile",
            Stage::Decode => "decode",
            Stage::StructuralValidation => "structural_validation",
            Stage::RuleValidation => "rule_validation",
            Stage::Query => "query",
            Stage::Transform => "transform",
            Stage::Encode => "encode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong, independent of where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// A schema, rule, or transform definition is malformed. Setup problem,
    /// not a data problem.
    Configuration,
    SchemaCompile,
    Decode,
    Encode,
    SchemaNotUnparseable,
    StructuralViolation,
    RuleViolation,
    UnboundNamespacePrefix,
    QueryEvaluation,
    EmptyQueryResult,
    Transform,
    RoundTripMismatch,
    Io,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::Configuration => "configuration",
            FailureClass::SchemaCompile => "schema_compile",
            FailureClass::Decode => "decode",
            FailureClass::Encode => "encode",
            FailureClass::SchemaNotUnparseable => "schema_not_unparseable",
            FailureClass::StructuralViolation => "structural_violation",
            FailureClass::RuleViolation => "rule_violation",
            FailureClass::UnboundNamespacePrefix => "unbound_namespace_prefix",
            FailureClass::QueryEvaluation => "query_evaluation",
            FailureClass::EmptyQueryResult => "empty_query_result",
            FailureClass::Transform => "transform",
            FailureClass::RoundTripMismatch => "round_trip_mismatch",
            FailureClass::Io => "io",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reported condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    pub stage: Stage,
    pub class: FailureClass,
    pub message: String,

    /// Identifier of the rule or assertion that fired, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,

    /// Byte offset, document path, or file path the diagnostic points at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        stage: Stage,
        class: FailureClass,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            stage,
            class,
            message: message.into(),
            rule_id: None,
            location: None,
        }
    }

    pub fn error(stage: Stage, class: FailureClass, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, stage, class, message)
    }

    pub fn warning(stage: Stage, class: FailureClass, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, stage, class, message)
    }

    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Re-home a diagnostic onto another stage, keeping everything else.
    ///
    /// Engines report with their own idea of the stage; the orchestrator owns
    /// the final attribution.
    pub fn restaged(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{severity}[{}/{}]", self.stage, self.class)?;
        if let Some(rule_id) = &self.rule_id {
            write!(f, " ({rule_id})")?;
        }
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Ordered diagnostics from one stage or one run.
pub type DiagnosticList = Vec<Diagnostic>;

/// Whether any diagnostic in the list is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// A successful stage product together with the warnings raised making it.
#[derive(Debug, Clone, PartialEq)]
pub struct Produced<T> {
    pub value: T,
    pub warnings: DiagnosticList,
}

impl<T> Produced<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(value: T, warnings: DiagnosticList) -> Self {
        Self { value, warnings }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Produced<U> {
        Produced {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}
