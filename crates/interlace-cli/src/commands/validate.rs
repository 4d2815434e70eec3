use crate::support::{
    compile_schema_or_exit, load_document_or_exit, print_diagnostics, read_bytes_or_exit,
    render_json_or_exit, usage_error,
};
use interlace_check::{RuleChecker, SchemaValidator};
use interlace_format::BuiltinFormat;
use interlace_kernel::{
    ConfigurationError, Document, FatalClass, RuleValidator, Stage, StructuralValidator,
    ValidationReport, decode,
};
use serde::Serialize;
use std::path::Path;

pub struct Args {
    pub schema_def: Option<String>,
    pub rules: Option<String>,
    pub document: Option<String>,
    pub data: Option<String>,
    pub schema: Option<String>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateOutput {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    structural: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rules: Option<ValidationReport>,
}

pub fn run(args: Args) {
    let document = load_input(&args);

    // Decoding with a schema implies that schema for structure too.
    let schema_def = args
        .schema_def
        .as_deref()
        .or(args.data.as_ref().and(args.schema.as_deref()));
    if schema_def.is_none() && args.rules.is_none() {
        usage_error("nothing to validate; pass --schema-def and/or --rules");
    }

    // A broken definition fails its own validator only; the other still runs.
    let structural = schema_def.map(|def| {
        reported(
            Stage::StructuralValidation,
            SchemaValidator::new().validate_structure(Path::new(def), &document),
        )
    });
    let rules = args.rules.as_deref().map(|rules| {
        reported(
            Stage::RuleValidation,
            RuleChecker::new().validate_rules(Path::new(rules), &document),
        )
    });
    let output = ValidateOutput {
        valid: structural.iter().chain(rules.iter()).all(|report| report.valid),
        structural,
        rules,
    };

    if args.json {
        println!("{}", render_json_or_exit(&output, "validation"));
    } else {
        print_human_summary(&output);
        for report in output.structural.iter().chain(output.rules.iter()) {
            print_diagnostics(&report.diagnostics);
        }
    }

    if !output.valid {
        std::process::exit(1);
    }
}

fn load_input(args: &Args) -> Document {
    match (&args.document, &args.data, &args.schema) {
        (Some(document), _, _) => load_document_or_exit(document),
        (None, Some(data), Some(schema)) => {
            let format = BuiltinFormat::new();
            let handle = compile_schema_or_exit(&format, schema);
            let bytes = read_bytes_or_exit(data);
            match decode(&format, &handle, &mut &bytes[..]) {
                Ok(produced) => {
                    print_diagnostics(&produced.warnings);
                    produced.value
                }
                Err(diagnostics) => {
                    print_diagnostics(&diagnostics);
                    std::process::exit(FatalClass::Decode.exit_code());
                }
            }
        }
        _ => usage_error("pass --document, or --data together with --schema"),
    }
}

fn reported(
    stage: Stage,
    result: Result<ValidationReport, ConfigurationError>,
) -> ValidationReport {
    result.unwrap_or_else(|err| ValidationReport::configuration_error(stage, &err))
}

fn verdict(report: &Option<ValidationReport>) -> String {
    match report {
        None => "not run".to_string(),
        Some(report) if report.valid => "valid".to_string(),
        Some(report) => format!("invalid ({} errors)", report.errors().count()),
    }
}

fn print_human_summary(output: &ValidateOutput) {
    println!("interlace validate");
    println!("  Structural: {}", verdict(&output.structural));
    println!("  Rules: {}", verdict(&output.rules));
    println!(
        "  Result: {}",
        if output.valid { "valid" } else { "invalid" }
    );
}
