use interlace_format::{BuiltinFormat, CompiledSchema};
use interlace_kernel::{Diagnostic, Document, NamespaceBindings, SchemaHandle};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Usage or setup problem: bad flags, unreadable input, malformed config.
pub const EXIT_USAGE: i32 = 64;

/// Logs go to stderr so stdout stays clean for results and bytes.
pub fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();
}

pub fn usage_error(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(EXIT_USAGE);
}

pub fn print_diagnostics<'a>(diagnostics: impl IntoIterator<Item = &'a Diagnostic>) {
    for diagnostic in diagnostics {
        eprintln!("{diagnostic}");
    }
}

/// Compile the schema or exit with the schema-compile code.
pub fn compile_schema_or_exit(
    format: &BuiltinFormat,
    schema: &str,
) -> SchemaHandle<CompiledSchema> {
    match SchemaHandle::compile(format, Path::new(schema)) {
        Ok(produced) => {
            print_diagnostics(&produced.warnings);
            produced.value
        }
        Err(diagnostics) => {
            print_diagnostics(&diagnostics);
            std::process::exit(1);
        }
    }
}

pub fn read_bytes_or_exit(path: &str) -> Vec<u8> {
    fs::read(path).unwrap_or_else(|err| usage_error(format!("failed to read {path}: {err}")))
}

pub fn load_document_or_exit(path: &str) -> Document {
    let text = fs::read_to_string(path)
        .unwrap_or_else(|err| usage_error(format!("failed to read {path}: {err}")));
    Document::from_json(&text)
        .unwrap_or_else(|err| usage_error(format!("{path} is not a document: {err}")))
}

/// Parse repeated `PREFIX=URI` flags.
pub fn parse_namespaces_or_exit(bindings: &[String]) -> NamespaceBindings {
    let mut namespaces = NamespaceBindings::new();
    for binding in bindings {
        match binding.split_once('=') {
            Some((prefix, uri)) if !prefix.is_empty() && !uri.is_empty() => {
                namespaces.bind(prefix, uri);
            }
            _ => usage_error(format!(
                "invalid namespace binding `{binding}`; expected PREFIX=URI"
            )),
        }
    }
    namespaces
}

pub fn render_json_or_exit<T: Serialize>(value: &T, what: &str) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|err| {
        eprintln!("error: failed to render {what} JSON: {err}");
        std::process::exit(EXIT_USAGE);
    })
}

/// Write to `out`, or to stdout when no path is given.
pub fn write_output_or_exit(out: Option<&str>, bytes: &[u8]) {
    let written = match out {
        Some(path) => fs::write(path, bytes).map_err(|err| format!("failed to write {path}: {err}")),
        None => std::io::stdout()
            .write_all(bytes)
            .map_err(|err| format!("failed to write stdout: {err}")),
    };
    if let Err(message) = written {
        usage_error(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_flags_bind_prefixes() {
        let namespaces = parse_namespaces_or_exit(&[
            "tns=http://example.com/dfdl/helloworld/".to_string(),
            "x=urn:a=b".to_string(),
        ]);
        assert_eq!(
            namespaces.resolve("tns"),
            Some("http://example.com/dfdl/helloworld/")
        );
        assert_eq!(namespaces.resolve("x"), Some("urn:a=b"));
    }
}
