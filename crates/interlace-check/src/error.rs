use interlace_kernel::QueryError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("unbound namespace prefix `{prefix}`")]
    UnboundPrefix { prefix: String },

    #[error("syntax error in `{expression}` at offset {offset}: {message}")]
    Syntax {
        expression: String,
        offset: usize,
        message: String,
    },

    #[error("{0}")]
    Evaluation(String),
}

impl ExprError {
    pub(crate) fn syntax(expression: &str, offset: usize, message: &str) -> Self {
        ExprError::Syntax {
            expression: expression.to_string(),
            offset,
            message: message.to_string(),
        }
    }
}

impl From<ExprError> for QueryError {
    fn from(err: ExprError) -> Self {
        match err {
            ExprError::UnboundPrefix { prefix } => QueryError::UnboundNamespacePrefix { prefix },
            ExprError::Syntax {
                expression,
                offset,
                message,
            } => QueryError::Syntax {
                expression,
                message: format!("at offset {offset}: {message}"),
            },
            ExprError::Evaluation(message) => QueryError::Evaluation(message),
        }
    }
}
