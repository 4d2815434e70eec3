//! # Interlace Check
//!
//! Built-in engines for the stages after decoding: structural validation,
//! declarative rule validation, path queries and template transforms.
//!
//! Everything except structural validation runs on one small path-expression
//! language:
//!
//! ```text
//! /tns:helloWorld/word[2]          absolute path, prefix bound by caller
//! word[position() = last()]/@id    predicates, attributes
//! count(//word) <= 2 and not(x)    functions, comparison, boolean logic
//! ```
//!
//! Prefixes are resolved when an expression is compiled, so an unbound
//! prefix is reported before any evaluation happens.

mod error;
mod eval;
mod expr;
mod lexer;
pub mod node;
mod query;
mod rules;
mod structural;
mod transform;

pub use error::ExprError;
pub use expr::{CompiledExpr, Function, Value};
pub use node::{NodeRef, NodeView};
pub use query::{PathQuery, to_scalar};
pub use rules::{RuleChecker, RuleSet};
pub use structural::{SchemaValidator, validate};
pub use transform::{Action, TemplateTransform, Transform};
