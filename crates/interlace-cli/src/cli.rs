use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "interlace",
    about = "Interlace: schema-governed decode, validate, query, transform and encode",
    version
)]
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug); RUST_LOG still wins
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline: compile, decode, validate, query, transform, encode
    Run {
        /// Pipeline config (interlace.toml); flags override its values
        #[arg(long)]
        config: Option<String>,

        /// Data-format schema definition
        #[arg(long)]
        schema: Option<String>,

        /// Input data file
        #[arg(long)]
        data: Option<String>,

        /// Schema definition for structural validation (defaults to --schema)
        #[arg(long)]
        structural_schema: Option<String>,

        /// Rule file for declarative validation
        #[arg(long)]
        rules: Option<String>,

        /// Transform definition applied before encoding
        #[arg(long)]
        transform: Option<String>,

        /// Path expression evaluated against the decoded document
        #[arg(long)]
        query: Option<String>,

        /// Namespace binding for the query, as PREFIX=URI (repeatable)
        #[arg(long = "ns", value_name = "PREFIX=URI")]
        namespaces: Vec<String>,

        /// Accept an empty query result instead of recording a failure
        #[arg(long)]
        allow_empty_query: bool,

        /// Run the two validators concurrently
        #[arg(long)]
        parallel_validation: bool,

        /// Write encoded output bytes here
        #[arg(long)]
        out: Option<String>,

        /// Exit 5 when the run completes with recorded failures
        #[arg(long)]
        strict: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode a data file and print the document as JSON
    Decode {
        /// Data-format schema definition
        #[arg(long)]
        schema: String,

        /// Input data file
        #[arg(long)]
        data: String,

        /// Write the document JSON here instead of stdout
        #[arg(long)]
        out: Option<String>,
    },

    /// Encode a document JSON file back to bytes
    Encode {
        /// Data-format schema definition
        #[arg(long)]
        schema: String,

        /// Document JSON (as produced by `interlace decode`)
        #[arg(long)]
        document: String,

        /// Write the bytes here instead of stdout
        #[arg(long)]
        out: Option<String>,
    },

    /// Run both validators over a document; exit 1 if it is not valid
    Validate {
        /// Schema definition for structural validation
        #[arg(long)]
        schema_def: Option<String>,

        /// Rule file for declarative validation
        #[arg(long)]
        rules: Option<String>,

        /// Document JSON to validate
        #[arg(long, conflicts_with = "data")]
        document: Option<String>,

        /// Data file to decode first (requires --schema)
        #[arg(long, requires = "schema")]
        data: Option<String>,

        /// Data-format schema used to decode --data
        #[arg(long)]
        schema: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate a path expression against a document JSON file
    Query {
        /// Document JSON to query
        #[arg(long)]
        document: String,

        /// Path expression
        #[arg(long)]
        expr: String,

        /// Namespace binding, as PREFIX=URI (repeatable)
        #[arg(long = "ns", value_name = "PREFIX=URI")]
        namespaces: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
