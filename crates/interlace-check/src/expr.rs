//! Path expressions: an XPath 1.0 flavoured subset over [`Document`] trees.
//!
//! Namespace prefixes are resolved once, at compile time, against the caller's
//! [`NamespaceBindings`]; evaluation never sees a prefix. An unprefixed name
//! test matches only elements in no namespace.
//!
//! Supported: absolute and relative location paths, `//`, `.`, `..`, `*`,
//! `@name`, `text()`, `node()`, predicates (numeric position or boolean),
//! string and number literals, `+ -`, comparisons, `and`/`or`, and the
//! functions listed in [`Function`].

use crate::error::ExprError;
use crate::eval::Evaluator;
use crate::lexer::{Spanned, Token, tokenize};
use crate::node::{NodeRef, resolve};
use interlace_kernel::{Document, NamespaceBindings};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Subtract(Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Literal(String),
    Number(f64),
    Call(Function, Vec<Expr>),
    Path(LocationPath),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Child,
    Attribute,
    SelfNode,
    Parent,
    DescendantOrSelf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeTest {
    /// Element (or attribute) name with its resolved namespace.
    Name {
        namespace: Option<String>,
        local: String,
    },
    Wildcard,
    Text,
    AnyNode,
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Count,
    String,
    StringLength,
    NormalizeSpace,
    Number,
    Not,
    True,
    False,
    Contains,
    StartsWith,
    Concat,
    Position,
    Last,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "count" => Function::Count,
            "string" => Function::String,
            "string-length" => Function::StringLength,
            "normalize-space" => Function::NormalizeSpace,
            "number" => Function::Number,
            "not" => Function::Not,
            "true" => Function::True,
            "false" => Function::False,
            "contains" => Function::Contains,
            "starts-with" => Function::StartsWith,
            "concat" => Function::Concat,
            "position" => Function::Position,
            "last" => Function::Last,
            _ => return None,
        })
    }

    /// Accepted argument counts, inclusive.
    fn arity(self) -> (usize, usize) {
        match self {
            Function::True | Function::False | Function::Position | Function::Last => (0, 0),
            Function::Count | Function::Not => (1, 1),
            Function::String
            | Function::StringLength
            | Function::NormalizeSpace
            | Function::Number => (0, 1),
            Function::Contains | Function::StartsWith => (2, 2),
            Function::Concat => (2, usize::MAX),
        }
    }
}

/// The result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nodes(Vec<NodeRef>),
    Text(String),
    Number(f64),
    Boolean(bool),
}

impl Value {
    pub fn to_text(&self, document: &Document) -> String {
        match self {
            Value::Nodes(nodes) => nodes
                .first()
                .and_then(|node| resolve(document, node))
                .map(|view| view.string_value())
                .unwrap_or_default(),
            Value::Text(text) => text.clone(),
            Value::Number(n) => format_number(*n),
            Value::Boolean(b) => b.to_string(),
        }
    }

    pub fn to_number(&self, document: &Document) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            other => parse_number(&other.to_text(document)),
        }
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Text(text) => !text.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
        }
    }
}

pub(crate) fn parse_number(text: &str) -> f64 {
    text.trim().parse().unwrap_or(f64::NAN)
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// A parsed expression with namespace prefixes already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    source: String,
    expr: Expr,
}

impl CompiledExpr {
    pub fn compile(source: &str, namespaces: &NamespaceBindings) -> Result<Self, ExprError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens: &tokens,
            pos: 0,
            namespaces,
        };
        let expr = parser.or_expr()?;
        if let Some((offset, token)) = parser.peek_spanned() {
            return Err(ExprError::syntax(
                source,
                offset,
                &format!("unexpected {token:?} after expression"),
            ));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Compile a match pattern. Relative paths match at any depth, as if
    /// written `//path`; the result must be a location path.
    pub fn compile_pattern(source: &str, namespaces: &NamespaceBindings) -> Result<Self, ExprError> {
        let compiled = Self::compile(source, namespaces)?;
        match compiled.expr {
            Expr::Path(path) if path.absolute => Ok(Self {
                source: compiled.source,
                expr: Expr::Path(path),
            }),
            Expr::Path(path) => {
                let mut steps = Vec::with_capacity(path.steps.len() + 1);
                steps.push(Step {
                    axis: Axis::DescendantOrSelf,
                    test: NodeTest::AnyNode,
                    predicates: Vec::new(),
                });
                steps.extend(path.steps);
                Ok(Self {
                    source: compiled.source,
                    expr: Expr::Path(LocationPath {
                        absolute: true,
                        steps,
                    }),
                })
            }
            _ => Err(ExprError::syntax(
                source,
                0,
                "a pattern must be a location path",
            )),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, document: &Document, context: &NodeRef) -> Result<Value, ExprError> {
        Evaluator::new(document).evaluate(&self.expr, context)
    }

    /// Evaluate and require a node-set.
    pub fn select(&self, document: &Document, context: &NodeRef) -> Result<Vec<NodeRef>, ExprError> {
        match self.evaluate(document, context)? {
            Value::Nodes(nodes) => Ok(nodes),
            other => Err(ExprError::Evaluation(format!(
                "`{}` evaluates to {}, not a node-set",
                self.source,
                value_kind(&other)
            ))),
        }
    }

    /// Evaluate and convert to a boolean.
    pub fn test(&self, document: &Document, context: &NodeRef) -> Result<bool, ExprError> {
        Ok(self.evaluate(document, context)?.to_boolean())
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Nodes(_) => "a node-set",
        Value::Text(_) => "a string",
        Value::Number(_) => "a number",
        Value::Boolean(_) => "a boolean",
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Spanned],
    pos: usize,
    namespaces: &'a NamespaceBindings,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(_, token)| token)
    }

    fn peek_spanned(&self) -> Option<(usize, &Token)> {
        self.tokens.get(self.pos).map(|(offset, token)| (*offset, token))
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.source.len(), |(offset, _)| *offset)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, token)| token.clone());
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ExprError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: &str) -> ExprError {
        ExprError::syntax(self.source, self.offset(), message)
    }

    fn or_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.equality_expr()?;
        while self.eat_keyword("and") {
            let right = self.equality_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.relational_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CompareOp::Eq,
                Some(Token::NotEq) => CompareOp::NotEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.relational_expr()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn relational_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.additive_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive_expr()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn additive_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.unary_expr()?;
        loop {
            if self.eat(&Token::Plus) {
                let right = self.unary_expr()?;
                left = Expr::Add(Box::new(left), Box::new(right));
            } else if self.eat(&Token::Minus) {
                let right = self.unary_expr()?;
                left = Expr::Subtract(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn unary_expr(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Negate(Box::new(self.unary_expr()?)));
        }
        self.primary_or_path()
    }

    fn primary_or_path(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Literal(_)) => match self.bump() {
                Some(Token::Literal(text)) => Ok(Expr::Literal(text)),
                _ => Err(self.error("expected a literal")),
            },
            Some(Token::Number(n)) => {
                let n = *n;
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.or_expr()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(inner)
            }
            Some(Token::Name(name))
                if self.peek_at(1) == Some(&Token::LParen) && !is_node_type(name) =>
            {
                let name = name.clone();
                self.function_call(&name)
            }
            Some(_) => Ok(Expr::Path(self.location_path()?)),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn function_call(&mut self, name: &str) -> Result<Expr, ExprError> {
        let start = self.offset();
        let function = Function::lookup(name)
            .ok_or_else(|| ExprError::syntax(self.source, start, &format!("unknown function `{name}`")))?;
        self.pos += 2; // name and `(`
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.or_expr()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma, "`,` or `)`")?;
            }
        }
        let (min, max) = function.arity();
        if args.len() < min || args.len() > max {
            return Err(ExprError::syntax(
                self.source,
                start,
                &format!("`{name}` does not take {} argument(s)", args.len()),
            ));
        }
        Ok(Expr::Call(function, args))
    }

    fn location_path(&mut self) -> Result<LocationPath, ExprError> {
        let mut steps = Vec::new();
        let absolute = match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if !self.at_step_start() {
                    return Ok(LocationPath {
                        absolute: true,
                        steps,
                    });
                }
                true
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                steps.push(descendant_or_self());
                true
            }
            _ => false,
        };

        steps.push(self.step()?);
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(descendant_or_self());
                steps.push(self.step()?);
            } else {
                break;
            }
        }
        Ok(LocationPath { absolute, steps })
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DotDot | Token::At | Token::Star | Token::Name(_))
        )
    }

    fn step(&mut self) -> Result<Step, ExprError> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfNode,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else {
            Axis::Child
        };
        let test = self.node_test()?;
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.or_expr()?);
            self.expect(&Token::RBracket, "`]`")?;
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn node_test(&mut self) -> Result<NodeTest, ExprError> {
        match self.peek() {
            Some(Token::Star) => {
                self.pos += 1;
                Ok(NodeTest::Wildcard)
            }
            Some(Token::Name(name)) => {
                let name = name.clone();
                if is_node_type(&name) && self.peek_at(1) == Some(&Token::LParen) {
                    self.pos += 1;
                    self.expect(&Token::LParen, "`(`")?;
                    self.expect(&Token::RParen, "`)`")?;
                    return Ok(if name == "text" {
                        NodeTest::Text
                    } else {
                        NodeTest::AnyNode
                    });
                }
                self.pos += 1;
                self.name_test(&name)
            }
            _ => Err(self.error("expected a name test")),
        }
    }

    fn name_test(&self, name: &str) -> Result<NodeTest, ExprError> {
        let (namespace, local) = match name.split_once(':') {
            None => (None, name),
            Some((prefix, local)) => {
                let uri = self
                    .namespaces
                    .resolve(prefix)
                    .ok_or_else(|| ExprError::UnboundPrefix {
                        prefix: prefix.to_string(),
                    })?;
                (Some(uri.to_string()), local)
            }
        };
        Ok(NodeTest::Name {
            namespace,
            local: local.to_string(),
        })
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "text" | "node")
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::AnyNode,
        predicates: Vec::new(),
    }
}
