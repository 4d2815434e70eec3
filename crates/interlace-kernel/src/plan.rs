//! What one pipeline run should do.
//!
//! A plan is pure data: paths to the definitions each stage consumes plus the
//! query to ask. It deserializes straight from an `interlace.toml`.

use crate::stage::NamespaceBindings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelinePlan {
    /// Data-format schema, compiled once and used for decode and encode.
    pub schema: PathBuf,

    /// Input data. Optional here because callers may supply bytes directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PathBuf>,

    /// Schema definition for structural validation. Defaults to `schema`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structural_schema: Option<PathBuf>,

    /// Set to false to skip structural validation altogether.
    #[serde(default = "default_true")]
    pub structural_validation: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QuerySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<PathBuf>,

    #[serde(default)]
    pub options: PipelineOptions,
}

fn default_true() -> bool {
    true
}

impl PipelinePlan {
    pub fn new(schema: impl Into<PathBuf>) -> Self {
        Self {
            schema: schema.into(),
            data: None,
            structural_schema: None,
            structural_validation: true,
            rules: None,
            query: None,
            transform: None,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_data(mut self, data: impl Into<PathBuf>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_rules(mut self, rules: impl Into<PathBuf>) -> Self {
        self.rules = Some(rules.into());
        self
    }

    pub fn with_structural_schema(mut self, schema_def: impl Into<PathBuf>) -> Self {
        self.structural_schema = Some(schema_def.into());
        self
    }

    pub fn without_structural_validation(mut self) -> Self {
        self.structural_validation = false;
        self
    }

    pub fn with_query(mut self, query: QuerySpec) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_transform(mut self, transform: impl Into<PathBuf>) -> Self {
        self.transform = Some(transform.into());
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Definition the structural validator should read, if it runs at all.
    pub fn structural_definition(&self) -> Option<&Path> {
        if !self.structural_validation {
            return None;
        }
        Some(self.structural_schema.as_deref().unwrap_or(&self.schema))
    }

    /// Resolve every relative path against `base`.
    ///
    /// Config files name their neighbours relative to themselves.
    pub fn resolved_against(mut self, base: &Path) -> Self {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.schema);
        for path in [
            self.data.as_mut(),
            self.structural_schema.as_mut(),
            self.rules.as_mut(),
            self.transform.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            join(path);
        }
        self
    }
}

/// The query stage request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySpec {
    pub expression: String,

    #[serde(default)]
    pub namespaces: NamespaceBindings,

    /// Whether an empty text result is a legitimate answer. When false an
    /// empty result is recorded as `EmptyQueryResult`.
    #[serde(default)]
    pub allow_empty: bool,
}

impl QuerySpec {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            namespaces: NamespaceBindings::default(),
            allow_empty: false,
        }
    }

    pub fn bind(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.bind(prefix, uri);
        self
    }

    pub fn allowing_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineOptions {
    /// Run the two validators on scoped threads. Observable results are
    /// identical to sequential execution.
    #[serde(default)]
    pub parallel_validation: bool,
}
