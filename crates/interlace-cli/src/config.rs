//! `interlace.toml`: a [`PipelinePlan`] on disk.
//!
//! ```toml
//! schema = "hello_world.toml"
//! data = "hello.dat"
//! rules = "no_third_word.rules.toml"
//!
//! [query]
//! expression = "/tns:helloWorld/word[2]"
//! namespaces = { tns = "http://example.com/dfdl/helloworld/" }
//!
//! [options]
//! parallel_validation = true
//! ```
//!
//! Relative paths are relative to the config file.

use interlace_kernel::PipelinePlan;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

pub fn load_plan(path: &Path) -> Result<PipelinePlan, ConfigError> {
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: display.clone(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    parse_plan(&text, base).map_err(|source| ConfigError::ParseToml {
        path: display,
        source,
    })
}

pub fn parse_plan(text: &str, base: &Path) -> Result<PipelinePlan, toml::de::Error> {
    let plan: PipelinePlan = toml::from_str(text)?;
    Ok(plan.resolved_against(base))
}

pub fn load_plan_or_exit(path: &str) -> PipelinePlan {
    load_plan(Path::new(path)).unwrap_or_else(|err| crate::support::usage_error(err))
}
