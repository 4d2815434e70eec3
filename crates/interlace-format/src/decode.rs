//! Bytes → [`Document`] under a [`CompiledSchema`].
//!
//! Occurrences are taken greedily. An optional occurrence that fails to
//! decode is abandoned and its input position restored; a required one
//! fails the element.

use crate::compile::{CompiledSchema, ElementDecl, ElementKind, LengthRule, SimpleType};
use crate::definition::ByteOrder;
use crate::error::DecodeError;
use interlace_kernel::{Document, Element};

/// A decoded document and the warnings produced while decoding it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub document: Document,
    pub warnings: Vec<String>,
}

pub fn decode(schema: &CompiledSchema, bytes: &[u8]) -> Result<Decoded, DecodeError> {
    let mut decoder = Decoder {
        schema,
        bytes,
        pos: 0,
        warnings: Vec::new(),
    };
    let root = decoder.element(&schema.root, true)?;
    if decoder.pos < bytes.len() {
        return Err(DecodeError {
            offset: decoder.pos,
            element: schema.root.name.local.clone(),
            message: format!("left over data: {} unconsumed byte(s)", bytes.len() - decoder.pos),
        });
    }
    Ok(Decoded {
        document: Document::new(root),
        warnings: decoder.warnings,
    })
}

struct Decoder<'a> {
    schema: &'a CompiledSchema,
    bytes: &'a [u8],
    pos: usize,
    warnings: Vec<String>,
}

impl Decoder<'_> {
    fn element(&mut self, decl: &ElementDecl, required: bool) -> Result<Element, DecodeError> {
        match &decl.kind {
            ElementKind::Sequence(children) => {
                let mut element = Element::new(decl.name.clone());
                for child in children {
                    for occurrence in self.occurrences(child)? {
                        element = element.with_child(occurrence);
                    }
                }
                Ok(element)
            }
            ElementKind::Simple { value_type, length } => {
                let (offset, raw) = self.field(decl, length, required)?;
                let text = match (value_type, length) {
                    (SimpleType::Int, LengthRule::Binary { byte_order, .. }) => {
                        binary_int(&raw, *byte_order).to_string()
                    }
                    (SimpleType::Int, _) => {
                        let text = self.text(decl, offset, &raw)?;
                        // The lexical form is kept so encoding reproduces it.
                        match text.parse::<i64>() {
                            Ok(_) => text,
                            Err(_) => {
                                return Err(DecodeError {
                                    offset,
                                    element: decl.name.local.clone(),
                                    message: format!("`{text}` is not an integer"),
                                });
                            }
                        }
                    }
                    (SimpleType::String, _) => self.text(decl, offset, &raw)?,
                };
                let mut element = Element::new(decl.name.clone());
                element.set_text(text);
                Ok(element)
            }
        }
    }

    /// Decode as many occurrences of `decl` as the data allows.
    fn occurrences(&mut self, decl: &ElementDecl) -> Result<Vec<Element>, DecodeError> {
        let mut found = Vec::new();
        while decl.max_occurs.allows(found.len() + 1) {
            let required = found.len() < decl.min_occurs as usize;
            let start = self.pos;
            let warnings_before = self.warnings.len();
            match self.element(decl, required) {
                Ok(element) => {
                    found.push(element);
                    if self.pos == start {
                        // Zero-width occurrences would repeat forever.
                        break;
                    }
                }
                Err(err) if required => return Err(err),
                Err(_) => {
                    self.pos = start;
                    self.warnings.truncate(warnings_before);
                    break;
                }
            }
        }
        Ok(found)
    }

    /// Consume the raw bytes of one simple value.
    fn field(
        &mut self,
        decl: &ElementDecl,
        length: &LengthRule,
        required: bool,
    ) -> Result<(usize, Vec<u8>), DecodeError> {
        let bytes = self.bytes;
        let start = self.pos;
        let rest = &bytes[start..];
        match length {
            LengthRule::Delimited { terminator } => {
                if rest.is_empty() {
                    return Err(self.error(decl, "no data".to_string()));
                }
                match find(rest, terminator) {
                    Some(end) => {
                        let value = rest[..end].to_vec();
                        self.pos += end + terminator.len();
                        Ok((start, value))
                    }
                    None if self.schema.final_terminator_optional => {
                        self.warnings.push(format!(
                            "{}: final terminator missing at end of data (offset {})",
                            decl.name.local,
                            self.bytes.len()
                        ));
                        let value = rest.to_vec();
                        self.pos = self.bytes.len();
                        Ok((start, value))
                    }
                    None => Err(self.error(
                        decl,
                        format!("terminator {:?} not found", String::from_utf8_lossy(terminator)),
                    )),
                }
            }
            LengthRule::Fixed { bytes, pad } => {
                if rest.len() < *bytes {
                    return Err(self.error(
                        decl,
                        format!("needs {bytes} byte(s), {} available", rest.len()),
                    ));
                }
                let field = &rest[..*bytes];
                let trimmed = field
                    .iter()
                    .rposition(|b| b != pad)
                    .map_or(&field[..0], |last| &field[..=last]);
                let value = trimmed.to_vec();
                self.pos += bytes;
                Ok((start, value))
            }
            LengthRule::Remaining => {
                if rest.is_empty() && !required {
                    return Err(self.error(decl, "no data".to_string()));
                }
                let value = rest.to_vec();
                self.pos = self.bytes.len();
                Ok((start, value))
            }
            LengthRule::Binary { bytes, .. } => {
                if rest.len() < *bytes {
                    return Err(self.error(
                        decl,
                        format!("needs {bytes} byte(s), {} available", rest.len()),
                    ));
                }
                let value = rest[..*bytes].to_vec();
                self.pos += bytes;
                Ok((start, value))
            }
        }
    }

    fn text(&self, decl: &ElementDecl, offset: usize, raw: &[u8]) -> Result<String, DecodeError> {
        self.schema.encoding.decode(raw).map_err(|bad| DecodeError {
            offset: offset + bad,
            element: decl.name.local.clone(),
            message: format!("byte 0x{:02X} is not valid {}", raw[bad], self.schema.encoding),
        })
    }

    fn error(&self, decl: &ElementDecl, message: String) -> DecodeError {
        DecodeError {
            offset: self.pos,
            element: decl.name.local.clone(),
            message,
        }
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn binary_int(raw: &[u8], byte_order: ByteOrder) -> i64 {
    let mut buf = [0u8; 8];
    let width = raw.len();
    match byte_order {
        ByteOrder::BigEndian => buf[8 - width..].copy_from_slice(raw),
        ByteOrder::LittleEndian => {
            for (i, byte) in raw.iter().enumerate() {
                buf[7 - i] = *byte;
            }
        }
    }
    // Sign-extend from the field width.
    let shift = 64 - 8 * width as u32;
    (i64::from_be_bytes(buf) << shift) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::definition::SchemaDefinition;

    fn schema(text: &str) -> CompiledSchema {
        let definition = SchemaDefinition::parse(text, "test.toml").unwrap();
        compile(&definition, "test.toml").unwrap().schema
    }

    fn words(optional_terminator: bool) -> CompiledSchema {
        schema(&format!(
            r#"
            [schema]
            namespace = "http://example.com/dfdl/helloworld/"
            encoding = "ascii"
            final_terminator_optional = {optional_terminator}

            [root]
            name = "helloWorld"
            type = "sequence"

            [[root.children]]
            name = "word"
            type = "string"
            length = {{ kind = "delimited", terminator = "\n" }}
            max_occurs = "unbounded"
            "#
        ))
    }

    fn texts(document: &Document) -> Vec<String> {
        document.root().child_elements().map(Element::text).collect()
    }

    #[test]
    fn hello_world_decodes_two_words() {
        let decoded = decode(&words(false), b"Hello\nWorld\n").unwrap();
        assert_eq!(texts(&decoded.document), ["Hello", "World"]);
        assert_eq!(
            decoded.document.root().name.namespace.as_deref(),
            Some("http://example.com/dfdl/helloworld/")
        );
        assert!(decoded.warnings.is_empty());
    }

    #[test]
    fn missing_required_occurrence_fails() {
        let err = decode(&words(false), b"").unwrap_err();
        assert_eq!(err.offset, 0);
        assert_eq!(err.element, "word");
        assert_eq!(err.message, "no data");
    }

    #[test]
    fn missing_final_terminator_is_an_error_unless_optional() {
        let err = decode(&words(false), b"Hello\nWorld").unwrap_err();
        assert_eq!(err.offset, 6);
        assert!(err.message.starts_with("left over data"));

        let decoded = decode(&words(true), b"Hello\nWorld").unwrap();
        assert_eq!(texts(&decoded.document), ["Hello", "World"]);
        assert_eq!(decoded.warnings.len(), 1);
        assert!(decoded.warnings[0].contains("final terminator missing"));
    }

    #[test]
    fn invalid_byte_is_located() {
        let err = decode(&words(false), b"H\xE9llo\nWorld\n").unwrap_err();
        assert_eq!(err.offset, 1);
        assert!(err.message.contains("0xE9"));
    }

    #[test]
    fn bounded_occurrences_leave_data_over() {
        let capped = schema(
            r#"
            [root]
            name = "pair"
            type = "sequence"

            [[root.children]]
            name = "word"
            type = "string"
            length = { kind = "delimited", terminator = "," }
            max_occurs = 2
            "#,
        );
        let err = decode(&capped, b"a,b,c,").unwrap_err();
        assert_eq!(err.offset, 4);
        assert_eq!(err.element, "pair");
    }

    #[test]
    fn optional_occurrence_backtracks() {
        let record = schema(
            r#"
            [root]
            name = "record"
            type = "sequence"

            [[root.children]]
            name = "code"
            type = "int"
            length = { kind = "fixed", bytes = 3 }
            min_occurs = 0

            [[root.children]]
            name = "label"
            type = "string"
            length = { kind = "remaining" }
            "#,
        );
        let decoded = decode(&record, b"abcdef").unwrap();
        let root = decoded.document.root();
        let names: Vec<&str> = root.child_elements().map(|e| e.name.local.as_str()).collect();
        assert_eq!(names, ["label"]);
        assert_eq!(root.text(), "abcdef");

        let decoded = decode(&record, b"42 xyz").unwrap();
        assert_eq!(texts(&decoded.document), ["42", "xyz"]);
    }

    #[test]
    fn fixed_fields_trim_padding_and_binary_ints_sign_extend() {
        let record = schema(
            r#"
            [root]
            name = "record"
            type = "sequence"

            [[root.children]]
            name = "name"
            type = "string"
            length = { kind = "fixed", bytes = 5, pad = "_" }

            [[root.children]]
            name = "delta"
            type = "int"
            length = { kind = "binary", bytes = 2 }

            [[root.children]]
            name = "count"
            type = "int"
            length = { kind = "binary", bytes = 4, byte_order = "little-endian" }
            "#,
        );
        let decoded = decode(&record, b"ab___\xFF\xFE\x01\x01\x00\x00").unwrap();
        assert_eq!(texts(&decoded.document), ["ab", "-2", "257"]);
    }

    #[test]
    fn text_int_must_parse() {
        let record = schema(
            r#"
            [root]
            name = "n"
            type = "int"
            length = { kind = "remaining" }
            "#,
        );
        let err = decode(&record, b"12a").unwrap_err();
        assert_eq!(err.message, "`12a` is not an integer");
        assert_eq!(decode(&record, b"-7").unwrap().document.root().text(), "-7");
        assert_eq!(decode(&record, b"007").unwrap().document.root().text(), "007");
    }
}
