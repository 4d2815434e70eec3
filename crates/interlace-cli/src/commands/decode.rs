use crate::support::{
    compile_schema_or_exit, print_diagnostics, read_bytes_or_exit, usage_error,
    write_output_or_exit,
};
use interlace_format::BuiltinFormat;
use interlace_kernel::{FatalClass, decode};

pub fn run(schema: String, data: String, out: Option<String>) {
    let format = BuiltinFormat::new();
    let handle = compile_schema_or_exit(&format, &schema);
    let bytes = read_bytes_or_exit(&data);

    let document = match decode(&format, &handle, &mut &bytes[..]) {
        Ok(produced) => {
            print_diagnostics(&produced.warnings);
            produced.value
        }
        Err(diagnostics) => {
            print_diagnostics(&diagnostics);
            std::process::exit(FatalClass::Decode.exit_code());
        }
    };

    let mut rendered = document
        .to_json_pretty()
        .unwrap_or_else(|err| usage_error(format!("failed to render document JSON: {err}")));
    rendered.push('\n');
    write_output_or_exit(out.as_deref(), rendered.as_bytes());
}
