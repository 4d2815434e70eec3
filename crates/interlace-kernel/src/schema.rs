//! Schema handles and the decode/encode entry points.
//!
//! A [`SchemaHandle`] can only be obtained by compiling a schema through a
//! [`DataFormat`]. Decode and encode take the handle, never a path, so the
//! two directions cannot silently run against different schemas.

use crate::diagnostic::{Diagnostic, DiagnosticList, FailureClass, Produced, Stage, has_errors};
use crate::document::Document;
use crate::stage::DataFormat;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Opaque compiled schema. Immutable after compilation.
#[derive(Debug)]
pub struct SchemaHandle<C> {
    source: PathBuf,
    digest: String,
    format: String,
    compiled: C,
}

impl<C> SchemaHandle<C> {
    /// Compile the schema at `path` with `format`.
    ///
    /// Compile diagnostics are attributed to [`Stage::Compile`].
    pub fn compile<F>(format: &F, path: &Path) -> Result<Produced<Self>, DiagnosticList>
    where
        F: DataFormat<Compiled = C>,
    {
        let source_bytes = std::fs::read(path).map_err(|err| {
            vec![
                Diagnostic::error(
                    Stage::Compile,
                    FailureClass::Io,
                    format!("cannot read schema: {err}"),
                )
                .with_location(path.display().to_string()),
            ]
        })?;
        let digest = schema_digest(&source_bytes);

        let produced = format
            .compile(path)
            .map_err(|diags| failure_list(diags, Stage::Compile, FailureClass::SchemaCompile))?;
        debug!(
            schema = %path.display(),
            digest = %digest,
            warnings = produced.warnings.len(),
            "schema compiled"
        );

        let warnings = restage_all(produced.warnings, Stage::Compile);
        Ok(Produced::with_warnings(
            Self {
                source: path.to_path_buf(),
                digest,
                format: format.name().to_string(),
                compiled: produced.value,
            },
            warnings,
        ))
    }

    /// Path the schema was compiled from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// `sha256:<hex>` of the schema source bytes.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Name of the format engine that compiled this handle.
    pub fn format_name(&self) -> &str {
        &self.format
    }

    pub fn compiled(&self) -> &C {
        &self.compiled
    }
}

/// Decode `input` into a document using `schema`.
pub fn decode<F: DataFormat>(
    format: &F,
    schema: &SchemaHandle<F::Compiled>,
    input: &mut dyn Read,
) -> Result<Produced<Document>, DiagnosticList> {
    check_engine(format, schema, Stage::Decode)?;
    match format.parse(schema.compiled(), input) {
        Ok(produced) => Ok(Produced::with_warnings(
            produced.value,
            restage_all(produced.warnings, Stage::Decode),
        )),
        Err(diags) => Err(failure_list(diags, Stage::Decode, FailureClass::Decode)),
    }
}

/// Encode `document` to bytes using `schema`.
pub fn encode<F: DataFormat>(
    format: &F,
    schema: &SchemaHandle<F::Compiled>,
    document: &Document,
) -> Result<Produced<Vec<u8>>, DiagnosticList> {
    check_engine(format, schema, Stage::Encode)?;
    match format.unparse(schema.compiled(), document) {
        Ok(produced) => Ok(Produced::with_warnings(
            produced.value,
            restage_all(produced.warnings, Stage::Encode),
        )),
        Err(diags) => Err(failure_list(diags, Stage::Encode, FailureClass::Encode)),
    }
}

fn check_engine<F: DataFormat>(
    format: &F,
    schema: &SchemaHandle<F::Compiled>,
    stage: Stage,
) -> Result<(), DiagnosticList> {
    if schema.format_name() == format.name() {
        return Ok(());
    }
    Err(vec![Diagnostic::error(
        stage,
        FailureClass::Configuration,
        format!(
            "schema {} was compiled by format `{}`, not `{}`",
            schema.source().display(),
            schema.format_name(),
            format.name()
        ),
    )])
}

fn restage_all(diags: DiagnosticList, stage: Stage) -> DiagnosticList {
    diags.into_iter().map(|d| d.restaged(stage)).collect()
}

/// Restage a failure list, making sure it carries at least one error.
fn failure_list(diags: DiagnosticList, stage: Stage, class: FailureClass) -> DiagnosticList {
    let mut diags = restage_all(diags, stage);
    if !has_errors(&diags) {
        diags.push(Diagnostic::error(
            stage,
            class,
            format!("{stage} failed without reporting a cause"),
        ));
    }
    diags
}

fn schema_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}
