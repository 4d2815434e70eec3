//! On-disk schema definitions (TOML), before semantic checking.

use crate::error::SchemaError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub schema: SchemaSection,
    pub root: ElementDefinition,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaSection {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub encoding: EncodingName,
    #[serde(default = "default_true")]
    pub unparse: bool,
    #[serde(default)]
    pub final_terminator_optional: bool,
    #[serde(default)]
    pub element_form: ElementForm,
}

impl Default for SchemaSection {
    fn default() -> Self {
        Self {
            namespace: None,
            encoding: EncodingName::default(),
            unparse: true,
            final_terminator_optional: false,
            element_form: ElementForm::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum EncodingName {
    #[serde(rename = "ascii", alias = "us-ascii")]
    Ascii,
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "iso-8859-1", alias = "latin-1")]
    Latin1,
}

/// Whether child elements live in the schema namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementForm {
    Qualified,
    #[default]
    Unqualified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeName {
    Sequence,
    String,
    Int,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LengthDefinition {
    Delimited {
        terminator: String,
    },
    Fixed {
        bytes: usize,
        #[serde(default)]
        pad: Option<String>,
    },
    Remaining,
    Binary {
        bytes: usize,
        #[serde(default)]
        byte_order: ByteOrder,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// `max_occurs`: a count or the keyword `"unbounded"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OccursDefinition {
    Count(i64),
    Keyword(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: TypeName,
    #[serde(default)]
    pub length: Option<LengthDefinition>,
    #[serde(default)]
    pub min_occurs: Option<i64>,
    #[serde(default)]
    pub max_occurs: Option<OccursDefinition>,
    #[serde(default)]
    pub children: Vec<ElementDefinition>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub min_inclusive: Option<i64>,
    #[serde(default)]
    pub max_inclusive: Option<i64>,
}

impl SchemaDefinition {
    pub fn parse(text: &str, path: &str) -> Result<Self, SchemaError> {
        toml::from_str(text).map_err(|source| SchemaError::ParseToml {
            path: path.to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let display = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| SchemaError::ReadFile {
            path: display.clone(),
            source,
        })?;
        Self::parse(&text, &display)
    }
}
