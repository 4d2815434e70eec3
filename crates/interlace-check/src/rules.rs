//! Declarative rule validation.
//!
//! A rule file groups assertions into patterns. Each rule names a context
//! pattern; every assertion is evaluated with each matching node as context,
//! and each false assertion is one finding carrying its message and test.
//!
//! ```toml
//! [namespaces]
//! tns = "http://example.com/dfdl/helloworld/"
//!
//! [[pattern]]
//! id = "word-count"
//!
//! [[pattern.rule]]
//! context = "/tns:helloWorld"
//!
//! [[pattern.rule.assert]]
//! id = "at-most-two-words"
//! test = "count(word) <= 2"
//! message = "a greeting has at most two words"
//! ```

use crate::error::ExprError;
use crate::expr::CompiledExpr;
use crate::node::{self, NodeRef};
use interlace_kernel::{
    ConfigurationError, Diagnostic, Document, FailureClass, NamespaceBindings, RuleValidator,
    Stage, ValidationReport,
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    #[serde(default)]
    namespaces: BTreeMap<String, String>,
    #[serde(default)]
    pattern: Vec<PatternDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatternDef {
    id: String,
    #[serde(default)]
    rule: Vec<RuleDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDef {
    context: String,
    #[serde(default)]
    assert: Vec<AssertDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AssertDef {
    id: Option<String>,
    test: String,
    message: String,
}

#[derive(Debug, Clone)]
struct Assertion {
    id: String,
    test: CompiledExpr,
    message: String,
}

#[derive(Debug, Clone)]
struct Rule {
    context: CompiledExpr,
    assertions: Vec<Assertion>,
}

#[derive(Debug, Clone)]
struct Pattern {
    id: String,
    rules: Vec<Rule>,
}

/// A loaded, compiled rule file.
#[derive(Debug, Clone)]
pub struct RuleSet {
    path: PathBuf,
    patterns: Vec<Pattern>,
}

impl RuleSet {
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = fs::read_to_string(path)
            .map_err(|err| invalid(path, format!("cannot read rule file: {err}")))?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigurationError> {
        let file: RuleFile =
            toml::from_str(text).map_err(|err| invalid(path, err.message().to_string()))?;
        let namespaces: NamespaceBindings = file.namespaces.into_iter().collect();

        if file.pattern.is_empty() {
            return Err(invalid(path, "rule file declares no patterns".to_string()));
        }
        let mut patterns = Vec::with_capacity(file.pattern.len());
        for pattern in file.pattern {
            if pattern.rule.is_empty() {
                return Err(invalid(
                    path,
                    format!("pattern `{}` has no rules", pattern.id),
                ));
            }
            let mut rules = Vec::with_capacity(pattern.rule.len());
            for rule in pattern.rule {
                if rule.assert.is_empty() {
                    return Err(invalid(
                        path,
                        format!(
                            "rule `{}` in pattern `{}` has no assertions",
                            rule.context, pattern.id
                        ),
                    ));
                }
                let context = CompiledExpr::compile_pattern(&rule.context, &namespaces)
                    .map_err(|err| invalid(path, err.to_string()))?;
                let assertions = rule
                    .assert
                    .into_iter()
                    .map(|assert| {
                        let test = CompiledExpr::compile(&assert.test, &namespaces)
                            .map_err(|err| invalid(path, err.to_string()))?;
                        Ok(Assertion {
                            id: assert.id.unwrap_or_else(|| pattern.id.clone()),
                            test,
                            message: assert.message,
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigurationError>>()?;
                rules.push(Rule {
                    context,
                    assertions,
                });
            }
            patterns.push(Pattern {
                id: pattern.id,
                rules,
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            patterns,
        })
    }

    /// Evaluate every assertion, one diagnostic per failure, ordered by
    /// document order and then by declaration order.
    pub fn check(&self, document: &Document) -> Result<ValidationReport, ExprError> {
        // (node, pattern index, assertion index within the pattern)
        let mut failures: Vec<(NodeRef, usize, usize, &Assertion)> = Vec::new();
        for (pattern_index, pattern) in self.patterns.iter().enumerate() {
            let mut claimed = BTreeSet::new();
            let mut first_assertion = 0;
            for rule in &pattern.rules {
                for node in rule.context.select(document, &NodeRef::document())? {
                    if !claimed.insert(node.clone()) {
                        continue;
                    }
                    for (offset, assertion) in rule.assertions.iter().enumerate() {
                        if !assertion.test.test(document, &node)? {
                            failures.push((
                                node.clone(),
                                pattern_index,
                                first_assertion + offset,
                                assertion,
                            ));
                        }
                    }
                }
                first_assertion += rule.assertions.len();
            }
        }
        failures.sort_by(|a, b| (&a.0, a.1, a.2).cmp(&(&b.0, b.1, b.2)));

        let diagnostics = failures
            .into_iter()
            .map(|(node, _, _, assertion)| {
                Diagnostic::error(
                    Stage::RuleValidation,
                    FailureClass::RuleViolation,
                    format!("{} (failed `{}`)", assertion.message, assertion.test.source()),
                )
                .with_rule_id(assertion.id.clone())
                .with_location(node::location(document, &node))
            })
            .collect::<Vec<_>>();
        debug!(
            rules = %self.path.display(),
            violations = diagnostics.len(),
            "rule validation finished"
        );
        Ok(ValidationReport::from_diagnostics(diagnostics))
    }
}

fn invalid(path: &Path, cause: String) -> ConfigurationError {
    ConfigurationError::InvalidRuleDefinition {
        path: path.to_path_buf(),
        cause,
    }
}

/// [`RuleValidator`] that loads a TOML rule file per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleChecker;

impl RuleChecker {
    pub fn new() -> Self {
        Self
    }
}

impl RuleValidator for RuleChecker {
    fn validate_rules(
        &self,
        rule_file: &Path,
        document: &Document,
    ) -> Result<ValidationReport, ConfigurationError> {
        let rules = RuleSet::load(rule_file)?;
        rules
            .check(document)
            .map_err(|err| invalid(rule_file, err.to_string()))
    }
}
