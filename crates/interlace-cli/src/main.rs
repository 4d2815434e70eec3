//! Interlace CLI: the `interlace` command.

mod cli;
mod commands;
mod config;
mod support;

use clap::Parser;
use clap::error::ErrorKind;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
            err.exit();
        }
        let _ = err.print();
        std::process::exit(support::EXIT_USAGE);
    });
    support::init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            schema,
            data,
            structural_schema,
            rules,
            transform,
            query,
            namespaces,
            allow_empty_query,
            parallel_validation,
            out,
            strict,
            json,
        } => commands::run::run(commands::run::Args {
            config,
            schema,
            data,
            structural_schema,
            rules,
            transform,
            query,
            namespaces,
            allow_empty_query,
            parallel_validation,
            out,
            strict,
            json,
        }),

        Commands::Decode { schema, data, out } => commands::decode::run(schema, data, out),

        Commands::Encode {
            schema,
            document,
            out,
        } => commands::encode::run(schema, document, out),

        Commands::Validate {
            schema_def,
            rules,
            document,
            data,
            schema,
            json,
        } => commands::validate::run(commands::validate::Args {
            schema_def,
            rules,
            document,
            data,
            schema,
            json,
        }),

        Commands::Query {
            document,
            expr,
            namespaces,
            json,
        } => commands::query::run(document, expr, namespaces, json),
    }
}
