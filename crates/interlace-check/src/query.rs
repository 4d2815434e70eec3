use crate::expr::{CompiledExpr, Value};
use crate::node::NodeRef;
use interlace_kernel::{Document, NamespaceBindings, QueryEngine, QueryError, Scalar};
use tracing::debug;

/// [`QueryEngine`] over the path-expression language. The context node is
/// the root element, so `word[2]` and `/tns:helloWorld/word[2]` agree.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathQuery;

impl PathQuery {
    pub fn new() -> Self {
        Self
    }
}

impl QueryEngine for PathQuery {
    fn query(
        &self,
        document: &Document,
        expression: &str,
        namespaces: &NamespaceBindings,
    ) -> Result<Scalar, QueryError> {
        let compiled = CompiledExpr::compile(expression, namespaces)?;
        let value = compiled.evaluate(document, &NodeRef::root())?;
        debug!(expression, "query evaluated");
        Ok(to_scalar(document, value))
    }
}

/// A node-set yields the string value of its first node, or `""` when empty.
pub fn to_scalar(document: &Document, value: Value) -> Scalar {
    match value {
        Value::Nodes(_) => Scalar::Text(value.to_text(document)),
        Value::Text(text) => Scalar::Text(text),
        Value::Number(n) => Scalar::Number(n),
        Value::Boolean(b) => Scalar::Boolean(b),
    }
}
