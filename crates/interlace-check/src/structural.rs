//! Structural validation against a schema definition.
//!
//! The document is checked against the same element tree the data format
//! decodes with: names, namespaces, occurrence bounds, simple content and
//! value facets. Every violation becomes its own diagnostic.

use interlace_format::{CompiledSchema, ElementDecl, ElementKind, Facets, MaxOccurs, SimpleType};
use interlace_kernel::{
    ConfigurationError, Diagnostic, Document, Element, FailureClass, Node, Stage,
    StructuralValidator, ValidationReport,
};
use std::path::Path;
use tracing::debug;

/// [`StructuralValidator`] backed by `interlace-format` schema definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        Self
    }
}

impl StructuralValidator for SchemaValidator {
    fn validate_structure(
        &self,
        schema_def: &Path,
        document: &Document,
    ) -> Result<ValidationReport, ConfigurationError> {
        let compilation = CompiledSchema::load(schema_def).map_err(|err| {
            ConfigurationError::InvalidSchemaDefinition {
                path: schema_def.to_path_buf(),
                cause: err.problems().join("; "),
            }
        })?;
        let diagnostics = validate(&compilation.schema, document);
        debug!(
            schema = %schema_def.display(),
            violations = diagnostics.len(),
            "structural validation finished"
        );
        Ok(ValidationReport::from_diagnostics(diagnostics))
    }
}

/// Check `document` against `schema`, one diagnostic per violation.
pub fn validate(schema: &CompiledSchema, document: &Document) -> Vec<Diagnostic> {
    let mut checker = Checker {
        violations: Vec::new(),
    };
    let root = document.root();
    let location = format!("/{}", root.name.local);
    if root.name != schema.root.name {
        checker.violation(
            &location,
            format!(
                "root element is `{}`, expected `{}`",
                root.name, schema.root.name
            ),
        );
    } else {
        checker.element(&schema.root, root, &location);
    }
    checker.violations
}

struct Checker {
    violations: Vec<Diagnostic>,
}

impl Checker {
    fn violation(&mut self, location: &str, message: String) {
        self.violations.push(
            Diagnostic::error(
                Stage::StructuralValidation,
                FailureClass::StructuralViolation,
                message,
            )
            .with_location(location),
        );
    }

    fn element(&mut self, decl: &ElementDecl, element: &Element, location: &str) {
        for attr in &element.attributes {
            self.violation(
                location,
                format!("attribute `{}` is not declared", attr.name),
            );
        }
        match &decl.kind {
            ElementKind::Sequence(children) => self.sequence(children, element, location),
            ElementKind::Simple { value_type, .. } => {
                if element.has_element_children() {
                    self.violation(
                        location,
                        format!("`{}` has simple content but contains elements", decl.name),
                    );
                    return;
                }
                self.value(*value_type, &decl.facets, &element.text(), location);
            }
        }
    }

    fn sequence(&mut self, children: &[ElementDecl], element: &Element, location: &str) {
        let has_text = element
            .children
            .iter()
            .any(|child| matches!(child, Node::Text(text) if !text.trim().is_empty()));
        if has_text {
            self.violation(location, "text is not allowed in a sequence".to_string());
        }

        let actual: Vec<&Element> = element.child_elements().collect();
        let mut next = 0;
        for decl in children {
            let mut count = 0;
            while next < actual.len() && actual[next].name == decl.name {
                count += 1;
                let child_location = format!("{location}/{}[{count}]", decl.name.local);
                if !decl.max_occurs.allows(count) {
                    let max = match decl.max_occurs {
                        MaxOccurs::Bounded(max) => max.to_string(),
                        MaxOccurs::Unbounded => "unbounded".to_string(),
                    };
                    self.violation(
                        &child_location,
                        format!(
                            "occurrence {count} of `{}` exceeds max_occurs ({max})",
                            decl.name
                        ),
                    );
                }
                self.element(decl, actual[next], &child_location);
                next += 1;
            }
            if count < decl.min_occurs as usize {
                self.violation(
                    location,
                    format!(
                        "expected at least {} `{}`, found {count}",
                        decl.min_occurs, decl.name
                    ),
                );
            }
        }
        for (offset, extra) in actual[next..].iter().enumerate() {
            self.violation(
                location,
                format!(
                    "unexpected element `{}` at child position {}",
                    extra.name,
                    next + offset + 1
                ),
            );
        }
    }

    fn value(&mut self, value_type: SimpleType, facets: &Facets, text: &str, location: &str) {
        if value_type == SimpleType::Int {
            match text.trim().parse::<i64>() {
                Ok(number) => {
                    if let Some(min) = facets.min_inclusive.filter(|min| number < *min) {
                        self.violation(location, format!("{number} is less than {min}"));
                    }
                    if let Some(max) = facets.max_inclusive.filter(|max| number > *max) {
                        self.violation(location, format!("{number} is greater than {max}"));
                    }
                }
                Err(_) => self.violation(location, format!("`{text}` is not a valid int")),
            }
        }
        let length = text.chars().count();
        if let Some(min) = facets.min_length.filter(|min| length < *min) {
            self.violation(
                location,
                format!("length {length} is shorter than min_length {min}"),
            );
        }
        if let Some(max) = facets.max_length.filter(|max| length > *max) {
            self.violation(
                location,
                format!("length {length} is longer than max_length {max}"),
            );
        }
        if let Some((source, regex)) = &facets.pattern {
            if !regex.is_match(text) {
                self.violation(
                    location,
                    format!("`{text}` does not match pattern `{source}`"),
                );
            }
        }
    }
}
