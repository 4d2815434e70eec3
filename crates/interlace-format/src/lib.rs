//! Built-in data format for Interlace.
//!
//! Schemas are TOML files describing a tree of elements: sequences of child
//! elements, and simple `string`/`int` values whose extent in the byte stream
//! is given by a length rule (delimited, fixed, remaining, binary). The same
//! compiled schema drives decoding and encoding, so a decode followed by an
//! encode reproduces the input bytes.
//!
//! ```toml
//! [schema]
//! namespace = "http://example.com/dfdl/helloworld/"
//! encoding = "ascii"
//!
//! [root]
//! name = "helloWorld"
//! type = "sequence"
//!
//! [[root.children]]
//! name = "word"
//! type = "string"
//! length = { kind = "delimited", terminator = "\n" }
//! max_occurs = "unbounded"
//! ```

mod compile;
mod decode;
mod definition;
mod encode;
mod encoding;
mod error;

pub use compile::{
    Compilation, CompiledSchema, ElementDecl, ElementKind, Facets, LengthRule, MaxOccurs,
    SimpleType, compile,
};
pub use decode::{Decoded, decode};
pub use definition::{
    ByteOrder, ElementDefinition, ElementForm, EncodingName, LengthDefinition, OccursDefinition,
    SchemaDefinition, SchemaSection, TypeName,
};
pub use encode::{Encoded, encode};
pub use encoding::TextEncoding;
pub use error::{DecodeError, EncodeError, SchemaError};

use interlace_kernel::{
    DataFormat, Diagnostic, DiagnosticList, Document, FailureClass, Produced, Stage,
};
use std::io::Read;
use std::path::Path;
use tracing::debug;

pub const FORMAT_NAME: &str = "interlace-toml";

/// The built-in [`DataFormat`]: TOML schema definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFormat;

impl BuiltinFormat {
    pub fn new() -> Self {
        Self
    }
}

impl DataFormat for BuiltinFormat {
    type Compiled = CompiledSchema;

    fn name(&self) -> &str {
        FORMAT_NAME
    }

    fn compile(&self, path: &Path) -> Result<Produced<CompiledSchema>, DiagnosticList> {
        match CompiledSchema::load(path) {
            Ok(compilation) => Ok(Produced::with_warnings(
                compilation.schema,
                compilation
                    .warnings
                    .into_iter()
                    .map(|warning| {
                        Diagnostic::warning(Stage::Compile, FailureClass::SchemaCompile, warning)
                            .with_location(path.display().to_string())
                    })
                    .collect(),
            )),
            Err(err) => Err(schema_diagnostics(&err)),
        }
    }

    fn parse(
        &self,
        compiled: &CompiledSchema,
        input: &mut dyn Read,
    ) -> Result<Produced<Document>, DiagnosticList> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes).map_err(|err| {
            vec![Diagnostic::error(
                Stage::Decode,
                FailureClass::Io,
                format!("cannot read input: {err}"),
            )]
        })?;
        debug!(bytes = bytes.len(), root = %compiled.root.name, "decoding");
        match decode(compiled, &bytes) {
            Ok(decoded) => Ok(Produced::with_warnings(
                decoded.document,
                decoded
                    .warnings
                    .into_iter()
                    .map(|warning| Diagnostic::warning(Stage::Decode, FailureClass::Decode, warning))
                    .collect(),
            )),
            Err(err) => Err(vec![
                Diagnostic::error(
                    Stage::Decode,
                    FailureClass::Decode,
                    format!("{}: {}", err.element, err.message),
                )
                .with_location(format!("offset {}", err.offset)),
            ]),
        }
    }

    fn unparse(
        &self,
        compiled: &CompiledSchema,
        document: &Document,
    ) -> Result<Produced<Vec<u8>>, DiagnosticList> {
        if !compiled.unparse {
            return Err(vec![Diagnostic::error(
                Stage::Encode,
                FailureClass::SchemaNotUnparseable,
                "schema declares `unparse = false`; encoding is not supported",
            )]);
        }
        match encode(compiled, document) {
            Ok(encoded) => {
                debug!(bytes = encoded.bytes.len(), "encoded");
                Ok(Produced::with_warnings(
                    encoded.bytes,
                    encoded
                        .warnings
                        .into_iter()
                        .map(|warning| {
                            Diagnostic::warning(Stage::Encode, FailureClass::Encode, warning)
                        })
                        .collect(),
                ))
            }
            Err(err) => Err(vec![
                Diagnostic::error(Stage::Encode, FailureClass::Encode, err.message)
                    .with_location(err.path),
            ]),
        }
    }
}

/// One compile diagnostic per schema problem.
fn schema_diagnostics(err: &SchemaError) -> DiagnosticList {
    let class = match err {
        SchemaError::ReadFile { .. } => FailureClass::Io,
        SchemaError::ParseToml { .. } | SchemaError::Invalid { .. } => FailureClass::SchemaCompile,
    };
    err.problems()
        .into_iter()
        .map(|problem| {
            Diagnostic::error(Stage::Compile, class, problem).with_location(err.path().to_string())
        })
        .collect()
}
