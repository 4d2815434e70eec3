use crate::config::load_plan_or_exit;
use crate::support::{
    parse_namespaces_or_exit, print_diagnostics, render_json_or_exit, usage_error,
    write_output_or_exit,
};
use interlace_check::{PathQuery, RuleChecker, SchemaValidator, TemplateTransform};
use interlace_format::BuiltinFormat;
use interlace_kernel::{
    Pipeline, PipelinePlan, PipelineResult, QuerySpec, RoundTrip, StageOutcome,
};
use std::fs::File;
use std::io::BufReader;
use tracing::info;

pub struct Args {
    pub config: Option<String>,
    pub schema: Option<String>,
    pub data: Option<String>,
    pub structural_schema: Option<String>,
    pub rules: Option<String>,
    pub transform: Option<String>,
    pub query: Option<String>,
    pub namespaces: Vec<String>,
    pub allow_empty_query: bool,
    pub parallel_validation: bool,
    pub out: Option<String>,
    pub strict: bool,
    pub json: bool,
}

pub fn run(args: Args) {
    let plan = build_plan(&args);
    let Some(data) = plan.data.clone() else {
        usage_error("no input data; pass --data or set `data` in the config");
    };
    // Unreadable input is a setup problem here, not a decode failure.
    let file = File::open(&data).unwrap_or_else(|err| {
        usage_error(format!("failed to open {}: {err}", data.display()))
    });

    let format = BuiltinFormat::new();
    let result = Pipeline::new(&format)
        .with_structural_validator(&SchemaValidator)
        .with_rule_validator(&RuleChecker)
        .with_query_engine(&PathQuery)
        .with_transform_engine(&TemplateTransform)
        .run(&plan, &mut BufReader::new(file));
    info!(status = %result.status, errors = result.error_count(), "run finished");

    if let (Some(out), Some(bytes)) = (args.out.as_deref(), result.output.as_deref()) {
        write_output_or_exit(Some(out), bytes);
    }

    if args.json {
        println!("{}", render_json_or_exit(&result, "pipeline result"));
    } else {
        print_human_summary(&plan, &result);
        print_diagnostics(result.diagnostics());
    }

    std::process::exit(result.exit_code(args.strict));
}

fn build_plan(args: &Args) -> PipelinePlan {
    let mut plan = match (&args.config, &args.schema) {
        (Some(config), _) => load_plan_or_exit(config),
        (None, Some(schema)) => PipelinePlan::new(schema),
        (None, None) => usage_error("pass --schema or --config"),
    };
    if let (Some(_), Some(schema)) = (&args.config, &args.schema) {
        plan.schema = schema.into();
    }
    if let Some(data) = &args.data {
        plan.data = Some(data.into());
    }
    if let Some(structural) = &args.structural_schema {
        plan.structural_schema = Some(structural.into());
    }
    if let Some(rules) = &args.rules {
        plan.rules = Some(rules.into());
    }
    if let Some(transform) = &args.transform {
        plan.transform = Some(transform.into());
    }

    let flag_namespaces = parse_namespaces_or_exit(&args.namespaces);
    plan.query = match (plan.query.take(), &args.query) {
        (previous, Some(expression)) => {
            let mut spec = QuerySpec::new(expression.as_str());
            if let Some(previous) = previous {
                spec.namespaces = previous.namespaces;
                spec.allow_empty = previous.allow_empty;
            }
            Some(spec)
        }
        (previous, None) => previous,
    };
    if let Some(spec) = plan.query.as_mut() {
        spec.namespaces = spec.namespaces.merged(&flag_namespaces);
        spec.allow_empty |= args.allow_empty_query;
    }
    plan.options.parallel_validation |= args.parallel_validation;
    plan
}

fn outcome_label(outcome: StageOutcome) -> &'static str {
    match outcome {
        StageOutcome::Success => "success",
        StageOutcome::Failed => "failed",
        StageOutcome::Skipped => "skipped",
    }
}

fn print_human_summary(plan: &PipelinePlan, result: &PipelineResult) {
    println!("interlace run");
    println!("  Schema: {}", plan.schema.display());
    if let Some(digest) = &result.schema_digest {
        println!("  Schema Digest: {digest}");
    }
    println!("  Status: {}", result.status);
    println!("  Stages:");
    for report in &result.stages {
        let count_suffix = if report.diagnostics.is_empty() {
            String::new()
        } else {
            format!(" ({} diagnostics)", report.diagnostics.len())
        };
        println!(
            "    - {}: {}{}",
            report.stage,
            outcome_label(report.outcome),
            count_suffix
        );
    }
    if let Some(value) = &result.query_value {
        println!("  Query: {value}");
    }
    match result.round_trip {
        RoundTrip::NotApplicable => {}
        RoundTrip::Identical => println!("  Round Trip: identical"),
        RoundTrip::Mismatch { first_difference } => {
            println!("  Round Trip: differs at offset {first_difference}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args() -> Args {
        Args {
            config: None,
            schema: Some("schema.toml".into()),
            data: Some("hello.dat".into()),
            structural_schema: None,
            rules: None,
            transform: None,
            query: None,
            namespaces: Vec::new(),
            allow_empty_query: false,
            parallel_validation: false,
            out: None,
            strict: false,
            json: false,
        }
    }

    #[test]
    fn flags_build_a_plan_without_config() {
        let plan = build_plan(&Args {
            query: Some("/tns:helloWorld/word[2]".into()),
            namespaces: vec!["tns=urn:hello".into()],
            allow_empty_query: true,
            parallel_validation: true,
            ..args()
        });
        assert_eq!(plan.schema, PathBuf::from("schema.toml"));
        assert_eq!(plan.data, Some(PathBuf::from("hello.dat")));
        let query = plan.query.unwrap();
        assert_eq!(query.expression, "/tns:helloWorld/word[2]");
        assert_eq!(query.namespaces.resolve("tns"), Some("urn:hello"));
        assert!(query.allow_empty);
        assert!(plan.options.parallel_validation);
    }

    #[test]
    fn namespaces_without_a_query_are_ignored() {
        let plan = build_plan(&Args {
            namespaces: vec!["tns=urn:hello".into()],
            ..args()
        });
        assert!(plan.query.is_none());
    }
}
