//! [`Document`] → bytes under a [`CompiledSchema`].

use crate::compile::{CompiledSchema, ElementDecl, ElementKind, LengthRule, SimpleType};
use crate::decode::find;
use crate::definition::ByteOrder;
use crate::error::EncodeError;
use interlace_kernel::{Document, Element, Node};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub warnings: Vec<String>,
}

pub fn encode(schema: &CompiledSchema, document: &Document) -> Result<Encoded, EncodeError> {
    let root = document.root();
    let path = format!("/{}", root.name.local);
    if root.name != schema.root.name {
        return Err(EncodeError {
            path,
            message: format!(
                "expected root element `{}`, found `{}`",
                schema.root.name, root.name
            ),
        });
    }
    let mut encoder = Encoder {
        schema,
        out: Vec::new(),
        warnings: Vec::new(),
    };
    encoder.element(&schema.root, root, &path)?;
    Ok(Encoded {
        bytes: encoder.out,
        warnings: encoder.warnings,
    })
}

struct Encoder<'a> {
    schema: &'a CompiledSchema,
    out: Vec<u8>,
    warnings: Vec<String>,
}

impl Encoder<'_> {
    fn element(&mut self, decl: &ElementDecl, element: &Element, path: &str) -> Result<(), EncodeError> {
        if !element.attributes.is_empty() {
            self.warnings.push(format!(
                "{path}: {} attribute(s) dropped; the data format cannot represent attributes",
                element.attributes.len()
            ));
        }
        match &decl.kind {
            ElementKind::Sequence(children) => self.sequence(children, element, path),
            ElementKind::Simple { value_type, length } => {
                if element.has_element_children() {
                    return Err(fail(path, "simple element has child elements"));
                }
                let text = element.text();
                let value = self.value(*value_type, length, &text, path)?;
                self.write(length, value, path)
            }
        }
    }

    fn sequence(
        &mut self,
        children: &[ElementDecl],
        element: &Element,
        path: &str,
    ) -> Result<(), EncodeError> {
        let stray_text = element
            .children
            .iter()
            .any(|child| matches!(child, Node::Text(text) if !text.trim().is_empty()));
        if stray_text {
            return Err(fail(path, "sequence contains text content"));
        }

        let actual: Vec<&Element> = element.child_elements().collect();
        let mut next = 0;
        for decl in children {
            let mut count = 0;
            while next < actual.len()
                && actual[next].name == decl.name
                && decl.max_occurs.allows(count + 1)
            {
                count += 1;
                let child_path = format!("{path}/{}[{count}]", decl.name.local);
                self.element(decl, actual[next], &child_path)?;
                next += 1;
            }
            if count < decl.min_occurs as usize {
                return Err(fail(
                    path,
                    &format!(
                        "missing element `{}`: found {count}, need at least {}",
                        decl.name, decl.min_occurs
                    ),
                ));
            }
        }
        if let Some(extra) = actual.get(next) {
            return Err(fail(
                path,
                &format!("unexpected element `{}` at child position {}", extra.name, next + 1),
            ));
        }
        Ok(())
    }

    fn value(
        &self,
        value_type: SimpleType,
        length: &LengthRule,
        text: &str,
        path: &str,
    ) -> Result<Vec<u8>, EncodeError> {
        match (value_type, length) {
            (SimpleType::Int, LengthRule::Binary { bytes, byte_order }) => {
                let value = parse_int(text, path)?;
                binary_bytes(value, *bytes, *byte_order).ok_or_else(|| {
                    fail(path, &format!("{value} does not fit in {bytes} byte(s)"))
                })
            }
            (SimpleType::Int, _) => {
                parse_int(text, path)?;
                self.text(text, path)
            }
            (SimpleType::String, _) => self.text(text, path),
        }
    }

    fn text(&self, text: &str, path: &str) -> Result<Vec<u8>, EncodeError> {
        self.schema.encoding.encode(text).map_err(|c| {
            fail(
                path,
                &format!("{c:?} cannot be represented in {}", self.schema.encoding),
            )
        })
    }

    fn write(&mut self, length: &LengthRule, value: Vec<u8>, path: &str) -> Result<(), EncodeError> {
        match length {
            LengthRule::Delimited { terminator } => {
                if find(&value, terminator).is_some() {
                    return Err(fail(path, "value contains the field terminator"));
                }
                self.out.extend_from_slice(&value);
                self.out.extend_from_slice(terminator);
            }
            LengthRule::Fixed { bytes, pad } => {
                if value.len() > *bytes {
                    return Err(fail(
                        path,
                        &format!("value needs {} bytes but the field holds {bytes}", value.len()),
                    ));
                }
                self.out.extend_from_slice(&value);
                self.out.resize(self.out.len() + bytes - value.len(), *pad);
            }
            LengthRule::Remaining | LengthRule::Binary { .. } => self.out.extend_from_slice(&value),
        }
        Ok(())
    }
}

fn fail(path: &str, message: &str) -> EncodeError {
    EncodeError {
        path: path.to_string(),
        message: message.to_string(),
    }
}

fn parse_int(text: &str, path: &str) -> Result<i64, EncodeError> {
    text.trim()
        .parse()
        .map_err(|_| fail(path, &format!("`{text}` is not an integer")))
}

fn binary_bytes(value: i64, width: usize, byte_order: ByteOrder) -> Option<Vec<u8>> {
    if width < 8 {
        let half = 1i64 << (8 * width - 1);
        if value < -half || value >= half {
            return None;
        }
    }
    let be = value.to_be_bytes();
    let mut bytes = be[8 - width..].to_vec();
    if byte_order == ByteOrder::LittleEndian {
        bytes.reverse();
    }
    Some(bytes)
}
