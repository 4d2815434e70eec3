//! Expression evaluation.

use crate::error::ExprError;
use crate::expr::{
    Axis, CompareOp, Expr, Function, LocationPath, NodeTest, Step, Value, format_number,
    parse_number,
};
use crate::node::{self, NodeRef, NodeView, resolve};
use interlace_kernel::Document;

/// Evaluation context: the context node and its position in the current
/// node list (1-based).
#[derive(Debug, Clone, Copy)]
struct Context<'c> {
    node: &'c NodeRef,
    position: usize,
    size: usize,
}

pub(crate) struct Evaluator<'d> {
    document: &'d Document,
}

impl<'d> Evaluator<'d> {
    pub(crate) fn new(document: &'d Document) -> Self {
        Self { document }
    }

    pub(crate) fn evaluate(&self, expr: &Expr, context: &NodeRef) -> Result<Value, ExprError> {
        self.eval(
            expr,
            Context {
                node: context,
                position: 1,
                size: 1,
            },
        )
    }

    fn eval(&self, expr: &Expr, ctx: Context<'_>) -> Result<Value, ExprError> {
        Ok(match expr {
            Expr::Or(left, right) => {
                Value::Boolean(self.eval(left, ctx)?.to_boolean() || self.eval(right, ctx)?.to_boolean())
            }
            Expr::And(left, right) => {
                Value::Boolean(self.eval(left, ctx)?.to_boolean() && self.eval(right, ctx)?.to_boolean())
            }
            Expr::Compare(op, left, right) => {
                let left = self.eval(left, ctx)?;
                let right = self.eval(right, ctx)?;
                Value::Boolean(self.compare(*op, &left, &right))
            }
            Expr::Add(left, right) => Value::Number(self.number(left, ctx)? + self.number(right, ctx)?),
            Expr::Subtract(left, right) => {
                Value::Number(self.number(left, ctx)? - self.number(right, ctx)?)
            }
            Expr::Negate(inner) => Value::Number(-self.number(inner, ctx)?),
            Expr::Literal(text) => Value::Text(text.clone()),
            Expr::Number(n) => Value::Number(*n),
            Expr::Call(function, args) => self.call(*function, args, ctx)?,
            Expr::Path(path) => Value::Nodes(self.path(path, ctx)?),
        })
    }

    fn number(&self, expr: &Expr, ctx: Context<'_>) -> Result<f64, ExprError> {
        Ok(self.eval(expr, ctx)?.to_number(self.document))
    }

    fn text(&self, expr: &Expr, ctx: Context<'_>) -> Result<String, ExprError> {
        Ok(self.eval(expr, ctx)?.to_text(self.document))
    }

    /// String value of the single optional argument, or of the context node.
    fn text_or_context(&self, args: &[Expr], ctx: Context<'_>) -> Result<String, ExprError> {
        match args.first() {
            Some(arg) => self.text(arg, ctx),
            None => Ok(self.string_value(ctx.node)),
        }
    }

    fn string_value(&self, node: &NodeRef) -> String {
        resolve(self.document, node)
            .map(|view| view.string_value())
            .unwrap_or_default()
    }

    fn call(&self, function: Function, args: &[Expr], ctx: Context<'_>) -> Result<Value, ExprError> {
        Ok(match function {
            Function::Count => match self.eval(&args[0], ctx)? {
                Value::Nodes(nodes) => Value::Number(nodes.len() as f64),
                _ => return Err(ExprError::Evaluation("count() expects a node-set".to_string())),
            },
            Function::String => Value::Text(self.text_or_context(args, ctx)?),
            Function::StringLength => {
                Value::Number(self.text_or_context(args, ctx)?.chars().count() as f64)
            }
            Function::NormalizeSpace => Value::Text(
                self.text_or_context(args, ctx)?
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Function::Number => match args.first() {
                Some(arg) => Value::Number(self.number(arg, ctx)?),
                None => Value::Number(parse_number(&self.string_value(ctx.node))),
            },
            Function::Not => Value::Boolean(!self.eval(&args[0], ctx)?.to_boolean()),
            Function::True => Value::Boolean(true),
            Function::False => Value::Boolean(false),
            Function::Contains => {
                let haystack = self.text(&args[0], ctx)?;
                let needle = self.text(&args[1], ctx)?;
                Value::Boolean(haystack.contains(&needle))
            }
            Function::StartsWith => {
                let haystack = self.text(&args[0], ctx)?;
                let prefix = self.text(&args[1], ctx)?;
                Value::Boolean(haystack.starts_with(&prefix))
            }
            Function::Concat => {
                let mut out = String::new();
                for arg in args {
                    out.push_str(&self.text(arg, ctx)?);
                }
                Value::Text(out)
            }
            Function::Position => Value::Number(ctx.position as f64),
            Function::Last => Value::Number(ctx.size as f64),
        })
    }

    fn path(&self, path: &LocationPath, ctx: Context<'_>) -> Result<Vec<NodeRef>, ExprError> {
        let mut current = if path.absolute {
            vec![NodeRef::document()]
        } else {
            vec![ctx.node.clone()]
        };
        for step in &path.steps {
            let mut next = Vec::new();
            for node in &current {
                let mut selected: Vec<NodeRef> = self
                    .axis(step.axis, node)
                    .into_iter()
                    .filter(|candidate| self.matches(step, candidate))
                    .collect();
                for predicate in &step.predicates {
                    selected = self.filter(selected, predicate)?;
                }
                next.extend(selected);
            }
            next.sort();
            next.dedup();
            current = next;
        }
        Ok(current)
    }

    fn axis(&self, axis: Axis, node: &NodeRef) -> Vec<NodeRef> {
        match axis {
            Axis::Child => node::children(self.document, node),
            Axis::Attribute => node::attributes(self.document, node),
            Axis::SelfNode => vec![node.clone()],
            Axis::Parent => node.parent().into_iter().collect(),
            Axis::DescendantOrSelf => node::descendants_or_self(self.document, node),
        }
    }

    fn matches(&self, step: &Step, candidate: &NodeRef) -> bool {
        let Some(view) = resolve(self.document, candidate) else {
            return false;
        };
        match (&step.test, view) {
            (NodeTest::AnyNode, _) => true,
            (NodeTest::Text, NodeView::Text(_)) => true,
            (NodeTest::Text, _) => false,
            (NodeTest::Wildcard, NodeView::Element(_) | NodeView::Attribute(_)) => true,
            (NodeTest::Wildcard, _) => false,
            (NodeTest::Name { namespace, local }, NodeView::Element(element)) => {
                element.name.matches(namespace.as_deref(), local)
            }
            (NodeTest::Name { namespace, local }, NodeView::Attribute(attr)) => {
                namespace.is_none() && attr.name == *local
            }
            (NodeTest::Name { .. }, _) => false,
        }
    }

    fn filter(&self, nodes: Vec<NodeRef>, predicate: &Expr) -> Result<Vec<NodeRef>, ExprError> {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (index, node) in nodes.into_iter().enumerate() {
            let position = index + 1;
            let ctx = Context {
                node: &node,
                position,
                size,
            };
            let keep = match self.eval(predicate, ctx)? {
                Value::Number(n) => n == position as f64,
                other => other.to_boolean(),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    fn compare(&self, op: CompareOp, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Nodes(left), Value::Nodes(right)) => left.iter().any(|l| {
                let l = self.string_value(l);
                right
                    .iter()
                    .any(|r| compare_atoms(op, &Value::Text(l.clone()), &Value::Text(self.string_value(r))))
            }),
            (Value::Nodes(nodes), Value::Boolean(b)) => compare_atoms(op, &Value::Boolean(!nodes.is_empty()), &Value::Boolean(*b)),
            (Value::Boolean(b), Value::Nodes(nodes)) => compare_atoms(op, &Value::Boolean(*b), &Value::Boolean(!nodes.is_empty())),
            (Value::Nodes(nodes), atom) => nodes
                .iter()
                .any(|n| compare_atoms(op, &Value::Text(self.string_value(n)), atom)),
            (atom, Value::Nodes(nodes)) => nodes
                .iter()
                .any(|n| compare_atoms(op, atom, &Value::Text(self.string_value(n)))),
            (left, right) => compare_atoms(op, left, right),
        }
    }
}

/// Compare two non-node-set values.
fn compare_atoms(op: CompareOp, left: &Value, right: &Value) -> bool {
    let number = |value: &Value| match value {
        Value::Number(n) => *n,
        Value::Boolean(b) => f64::from(u8::from(*b)),
        Value::Text(text) => parse_number(text),
        Value::Nodes(_) => f64::NAN,
    };
    match op {
        CompareOp::Eq | CompareOp::NotEq => {
            let equal = match (left, right) {
                (Value::Boolean(_), _) | (_, Value::Boolean(_)) => {
                    atom_boolean(left) == atom_boolean(right)
                }
                (Value::Number(_), _) | (_, Value::Number(_)) => number(left) == number(right),
                _ => atom_text(left) == atom_text(right),
            };
            if op == CompareOp::Eq { equal } else { !equal }
        }
        CompareOp::Lt => number(left) < number(right),
        CompareOp::Le => number(left) <= number(right),
        CompareOp::Gt => number(left) > number(right),
        CompareOp::Ge => number(left) >= number(right),
    }
}

fn atom_boolean(value: &Value) -> bool {
    value.to_boolean()
}

fn atom_text(value: &Value) -> String {
    match value {
        Value::Text(text) => text.clone(),
        Value::Number(n) => format_number(*n),
        Value::Boolean(b) => b.to_string(),
        Value::Nodes(_) => String::new(),
    }
}
