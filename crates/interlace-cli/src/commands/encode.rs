use crate::support::{
    compile_schema_or_exit, load_document_or_exit, print_diagnostics, write_output_or_exit,
};
use interlace_format::BuiltinFormat;
use interlace_kernel::{FatalClass, encode};

pub fn run(schema: String, document: String, out: Option<String>) {
    let format = BuiltinFormat::new();
    let handle = compile_schema_or_exit(&format, &schema);
    let document = load_document_or_exit(&document);

    match encode(&format, &handle, &document) {
        Ok(produced) => {
            print_diagnostics(&produced.warnings);
            write_output_or_exit(out.as_deref(), &produced.value);
        }
        Err(diagnostics) => {
            print_diagnostics(&diagnostics);
            std::process::exit(FatalClass::Encode.exit_code());
        }
    }
}
