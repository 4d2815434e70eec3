//! Semantic checking: [`SchemaDefinition`] → [`CompiledSchema`].
//!
//! Every problem in a definition is collected before compilation fails, so
//! one run surfaces all of them.

use crate::definition::{
    ByteOrder, ElementDefinition, ElementForm, LengthDefinition, OccursDefinition,
    SchemaDefinition, TypeName,
};
use crate::encoding::TextEncoding;
use crate::error::SchemaError;
use interlace_kernel::QName;
use regex::Regex;
use std::path::Path;
use tracing::debug;

const UNBOUNDED: &str = "unbounded";

/// Upper occurrence bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

impl MaxOccurs {
    pub fn allows(self, count: usize) -> bool {
        match self {
            MaxOccurs::Bounded(max) => count <= max as usize,
            MaxOccurs::Unbounded => true,
        }
    }

    pub fn repeats(self) -> bool {
        self != MaxOccurs::Bounded(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleType {
    String,
    Int,
}

/// How many bytes a simple value occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LengthRule {
    Delimited { terminator: Vec<u8> },
    Fixed { bytes: usize, pad: u8 },
    Remaining,
    Binary { bytes: usize, byte_order: ByteOrder },
}

/// Value constraints enforced by structural validation, not by decoding.
#[derive(Debug, Clone, Default)]
pub struct Facets {
    pub pattern: Option<(String, Regex)>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_inclusive: Option<i64>,
    pub max_inclusive: Option<i64>,
}

impl Facets {
    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.min_inclusive.is_none()
            && self.max_inclusive.is_none()
    }
}

#[derive(Debug, Clone)]
pub enum ElementKind {
    Sequence(Vec<ElementDecl>),
    Simple {
        value_type: SimpleType,
        length: LengthRule,
    },
}

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: QName,
    pub kind: ElementKind,
    pub min_occurs: u32,
    pub max_occurs: MaxOccurs,
    pub facets: Facets,
}

impl ElementDecl {
    pub fn children(&self) -> &[ElementDecl] {
        match &self.kind {
            ElementKind::Sequence(children) => children,
            ElementKind::Simple { .. } => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledSchema {
    pub namespace: Option<String>,
    pub encoding: TextEncoding,
    pub unparse: bool,
    pub final_terminator_optional: bool,
    pub root: ElementDecl,
}

/// A compiled schema plus the warnings compilation produced.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub schema: CompiledSchema,
    pub warnings: Vec<String>,
}

impl CompiledSchema {
    /// Read, parse, and check the definition at `path`.
    pub fn load(path: &Path) -> Result<Compilation, SchemaError> {
        let definition = SchemaDefinition::load(path)?;
        compile(&definition, &path.display().to_string())
    }
}

pub fn compile(definition: &SchemaDefinition, path: &str) -> Result<Compilation, SchemaError> {
    let section = &definition.schema;
    let mut ctx = Compiler {
        encoding: section.encoding.into(),
        namespace: section.namespace.clone().filter(|ns| !ns.is_empty()),
        element_form: section.element_form,
        problems: Vec::new(),
        warnings: Vec::new(),
    };

    let root_def = &definition.root;
    if root_def.min_occurs.is_some_and(|n| n != 1)
        || root_def
            .max_occurs
            .as_ref()
            .is_some_and(|m| *m != OccursDefinition::Count(1))
    {
        ctx.problems
            .push(format!("{}: the root element must occur exactly once", root_def.name));
    }
    let root = ctx.element(root_def, root_def.name.clone(), true);

    if !ctx.problems.is_empty() {
        return Err(SchemaError::Invalid {
            path: path.to_string(),
            problems: ctx.problems,
        });
    }
    debug!(
        schema = path,
        root = %root.name,
        warnings = ctx.warnings.len(),
        "schema definition compiled"
    );
    Ok(Compilation {
        schema: CompiledSchema {
            namespace: ctx.namespace,
            encoding: ctx.encoding,
            unparse: section.unparse,
            final_terminator_optional: section.final_terminator_optional,
            root,
        },
        warnings: ctx.warnings,
    })
}

struct Compiler {
    encoding: TextEncoding,
    namespace: Option<String>,
    element_form: ElementForm,
    problems: Vec<String>,
    warnings: Vec<String>,
}

impl Compiler {
    fn element(&mut self, def: &ElementDefinition, at: String, is_root: bool) -> ElementDecl {
        if !is_ncname(&def.name) {
            self.problems
                .push(format!("{at}: `{}` is not a valid element name", def.name));
        }
        let name = match (&self.namespace, is_root, self.element_form) {
            (Some(ns), true, _) | (Some(ns), false, ElementForm::Qualified) => {
                QName::qualified(ns.clone(), def.name.clone())
            }
            _ => QName::local(def.name.clone()),
        };

        let (min_occurs, max_occurs) = if is_root {
            (1, MaxOccurs::Bounded(1))
        } else {
            self.occurs(def, &at)
        };

        let kind = match def.type_name {
            TypeName::Sequence => {
                if def.length.is_some() {
                    self.problems
                        .push(format!("{at}: a sequence cannot declare a length"));
                }
                if def.children.is_empty() {
                    self.problems
                        .push(format!("{at}: a sequence needs at least one child"));
                }
                let children = def
                    .children
                    .iter()
                    .map(|child| self.element(child, format!("{at}/{}", child.name), false))
                    .collect();
                ElementKind::Sequence(children)
            }
            TypeName::String | TypeName::Int => {
                let value_type = if def.type_name == TypeName::Int {
                    SimpleType::Int
                } else {
                    SimpleType::String
                };
                if !def.children.is_empty() {
                    self.problems
                        .push(format!("{at}: a simple element cannot have children"));
                }
                let length = self.length(def, value_type, &at);
                if length == LengthRule::Remaining && max_occurs.repeats() {
                    self.warnings.push(format!(
                        "{at}: repeating element uses `remaining` length; only the first occurrence can hold data"
                    ));
                }
                ElementKind::Simple { value_type, length }
            }
        };

        let facets = self.facets(def, &at);
        ElementDecl {
            name,
            kind,
            min_occurs,
            max_occurs,
            facets,
        }
    }

    fn occurs(&mut self, def: &ElementDefinition, at: &str) -> (u32, MaxOccurs) {
        let min = match def.min_occurs {
            None => 1,
            Some(n) => match u32::try_from(n) {
                Ok(n) => n,
                Err(_) => {
                    self.problems
                        .push(format!("{at}: min_occurs must be a non-negative integer"));
                    1
                }
            },
        };
        let max = match &def.max_occurs {
            None => MaxOccurs::Bounded(1),
            Some(OccursDefinition::Keyword(word)) if word == UNBOUNDED => MaxOccurs::Unbounded,
            Some(OccursDefinition::Keyword(word)) => {
                self.problems.push(format!(
                    "{at}: max_occurs must be an integer or \"{UNBOUNDED}\", found `{word}`"
                ));
                MaxOccurs::Unbounded
            }
            Some(OccursDefinition::Count(n)) => match u32::try_from(*n) {
                Ok(n) if n >= 1 => MaxOccurs::Bounded(n),
                _ => {
                    self.problems
                        .push(format!("{at}: max_occurs must be at least 1"));
                    MaxOccurs::Unbounded
                }
            },
        };
        if let MaxOccurs::Bounded(max) = max {
            if max < min {
                self.problems.push(format!(
                    "{at}: max_occurs ({max}) is less than min_occurs ({min})"
                ));
            }
        }
        (min, max)
    }

    fn length(&mut self, def: &ElementDefinition, value_type: SimpleType, at: &str) -> LengthRule {
        let Some(length) = &def.length else {
            self.problems
                .push(format!("{at}: a simple element must declare a length"));
            return LengthRule::Remaining;
        };
        match length {
            LengthDefinition::Delimited { terminator } => {
                if terminator.is_empty() {
                    self.problems
                        .push(format!("{at}: terminator must not be empty"));
                }
                LengthRule::Delimited {
                    terminator: self.text_bytes(terminator, "terminator", at),
                }
            }
            LengthDefinition::Fixed { bytes, pad } => {
                if *bytes == 0 {
                    self.problems
                        .push(format!("{at}: fixed length must be greater than zero"));
                }
                let pad_bytes = self.text_bytes(pad.as_deref().unwrap_or(" "), "pad", at);
                let pad = match pad_bytes.as_slice() {
                    [byte] => *byte,
                    _ => {
                        self.problems
                            .push(format!("{at}: pad must be a single byte in {}", self.encoding));
                        b' '
                    }
                };
                LengthRule::Fixed { bytes: *bytes, pad }
            }
            LengthDefinition::Remaining => LengthRule::Remaining,
            LengthDefinition::Binary { bytes, byte_order } => {
                if value_type != SimpleType::Int {
                    self.problems
                        .push(format!("{at}: binary length is only valid for int elements"));
                }
                if ![1, 2, 4, 8].contains(bytes) {
                    self.problems.push(format!(
                        "{at}: binary width must be 1, 2, 4 or 8 bytes, found {bytes}"
                    ));
                }
                LengthRule::Binary {
                    bytes: *bytes,
                    byte_order: *byte_order,
                }
            }
        }
    }

    fn text_bytes(&mut self, text: &str, what: &str, at: &str) -> Vec<u8> {
        match self.encoding.encode(text) {
            Ok(bytes) => bytes,
            Err(c) => {
                self.problems.push(format!(
                    "{at}: {what} contains {c:?}, which {} cannot represent",
                    self.encoding
                ));
                Vec::new()
            }
        }
    }

    fn facets(&mut self, def: &ElementDefinition, at: &str) -> Facets {
        let is_string = def.type_name == TypeName::String;
        let is_int = def.type_name == TypeName::Int;

        let pattern = def.pattern.as_ref().and_then(|source| {
            if def.type_name == TypeName::Sequence {
                self.problems
                    .push(format!("{at}: pattern is only valid on simple elements"));
                return None;
            }
            match Regex::new(&format!("^(?:{source})$")) {
                Ok(regex) => Some((source.clone(), regex)),
                Err(err) => {
                    self.problems
                        .push(format!("{at}: pattern `{source}` does not compile: {err}"));
                    None
                }
            }
        });

        if !is_string && (def.min_length.is_some() || def.max_length.is_some()) {
            self.problems
                .push(format!("{at}: min_length/max_length apply to string elements only"));
        }
        if let (Some(min), Some(max)) = (def.min_length, def.max_length) {
            if min > max {
                self.problems
                    .push(format!("{at}: min_length ({min}) exceeds max_length ({max})"));
            }
        }
        if !is_int && (def.min_inclusive.is_some() || def.max_inclusive.is_some()) {
            self.problems
                .push(format!("{at}: min_inclusive/max_inclusive apply to int elements only"));
        }
        if let (Some(min), Some(max)) = (def.min_inclusive, def.max_inclusive) {
            if min > max {
                self.problems
                    .push(format!("{at}: min_inclusive ({min}) exceeds max_inclusive ({max})"));
            }
        }

        Facets {
            pattern,
            min_length: def.min_length,
            max_length: def.max_length,
            min_inclusive: def.min_inclusive,
            max_inclusive: def.max_inclusive,
        }
    }
}

/// XML NCName, restricted to ASCII.
fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
