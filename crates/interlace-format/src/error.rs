use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema: {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml at {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid schema at {path}: {}", .problems.join("; "))]
    Invalid { path: String, problems: Vec<String> },
}

impl SchemaError {
    pub fn path(&self) -> &str {
        match self {
            SchemaError::ReadFile { path, .. }
            | SchemaError::ParseToml { path, .. }
            | SchemaError::Invalid { path, .. } => path,
        }
    }

    /// One line per problem, for callers that report problems individually.
    pub fn problems(&self) -> Vec<String> {
        match self {
            SchemaError::ReadFile { source, .. } => vec![format!("cannot read schema: {source}")],
            SchemaError::ParseToml { source, .. } => vec![source.message().to_string()],
            SchemaError::Invalid { problems, .. } => problems.clone(),
        }
    }
}

/// A failure while decoding bytes, located by byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{element}: {message} (offset {offset})")]
pub struct DecodeError {
    pub offset: usize,
    pub element: String,
    pub message: String,
}

/// A failure while encoding a document, located by element path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct EncodeError {
    pub path: String,
    pub message: String,
}
