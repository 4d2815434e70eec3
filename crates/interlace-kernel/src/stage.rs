//! Collaborator contracts.
//!
//! The orchestrator drives engines it does not implement. Each trait here is
//! the whole interface the kernel relies on; built-in engines live in
//! `interlace-format` and `interlace-check`, and tests substitute their own.

use crate::diagnostic::{Diagnostic, DiagnosticList, FailureClass, Produced, Stage, has_errors};
use crate::document::Document;
use crate::error::{ConfigurationError, QueryError, TransformError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Schema compiler plus parse/unparse engine.
///
/// `Compiled` is whatever the engine needs to run; the kernel only ever holds
/// it inside a [`SchemaHandle`](crate::schema::SchemaHandle).
pub trait DataFormat {
    type Compiled;

    /// Name of this format engine (for diagnostics).
    fn name(&self) -> &str;

    /// Compile the schema at `path`.
    fn compile(&self, path: &Path) -> Result<Produced<Self::Compiled>, DiagnosticList>;

    /// Parse bytes into a document. No partial document on failure.
    fn parse(
        &self,
        compiled: &Self::Compiled,
        input: &mut dyn Read,
    ) -> Result<Produced<Document>, DiagnosticList>;

    /// Unparse a document back to bytes.
    fn unparse(
        &self,
        compiled: &Self::Compiled,
        document: &Document,
    ) -> Result<Produced<Vec<u8>>, DiagnosticList>;
}

/// Structural (XSD-style) validator.
pub trait StructuralValidator {
    fn validate_structure(
        &self,
        schema_def: &Path,
        document: &Document,
    ) -> Result<ValidationReport, ConfigurationError>;
}

/// Declarative-rule (Schematron-style) validator.
pub trait RuleValidator {
    fn validate_rules(
        &self,
        rule_file: &Path,
        document: &Document,
    ) -> Result<ValidationReport, ConfigurationError>;
}

/// Path-expression evaluator.
pub trait QueryEngine {
    fn query(
        &self,
        document: &Document,
        expression: &str,
        namespaces: &NamespaceBindings,
    ) -> Result<Scalar, QueryError>;
}

/// Tree-transform engine. Must return a new document.
pub trait TransformEngine {
    fn transform(
        &self,
        document: &Document,
        transform_def: &Path,
    ) -> Result<Document, TransformError>;
}

/// Outcome of one validator run over a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub diagnostics: DiagnosticList,
}

impl ValidationReport {
    /// Build a report from findings; valid iff none is an error.
    pub fn from_diagnostics(diagnostics: DiagnosticList) -> Self {
        Self {
            valid: !has_errors(&diagnostics),
            diagnostics,
        }
    }

    /// A validator that could not run: one configuration error, located at
    /// the offending definition.
    pub fn configuration_error(stage: Stage, err: &ConfigurationError) -> Self {
        Self {
            valid: false,
            diagnostics: vec![
                Diagnostic::error(stage, FailureClass::Configuration, err.to_string())
                    .with_location(err.path().display().to_string()),
            ],
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

/// Prefix → namespace URI bindings for path expressions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceBindings(BTreeMap<String, String>);

impl NamespaceBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.bind(prefix, uri);
        self
    }

    pub fn bind(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.0.insert(prefix.into(), uri.into());
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.0.get(prefix).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `other` on top of `self`; `other` wins on conflicts.
    pub fn merged(&self, other: &NamespaceBindings) -> NamespaceBindings {
        let mut out = self.clone();
        for (prefix, uri) in other.iter() {
            out.bind(prefix, uri);
        }
        out
    }
}

impl FromIterator<(String, String)> for NamespaceBindings {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Typed scalar produced by the query stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Text(String),
    Number(f64),
    Boolean(bool),
}

impl Scalar {
    /// Whether this is the empty text value a no-match path yields.
    pub fn is_empty_text(&self) -> bool {
        matches!(self, Scalar::Text(text) if text.is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(text) => f.write_str(text),
            Scalar::Number(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{}", *n as i64),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Boolean(b) => write!(f, "{b}"),
        }
    }
}
