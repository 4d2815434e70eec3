//! # Interlace Kernel
//!
//! Orchestration and diagnostic aggregation for a schema-governed interchange
//! pipeline: bytes are decoded into a structured document, validated by two
//! independent validators, queried, transformed, and encoded back to bytes.
//!
//! This crate is **engine-agnostic**: it does not know how bytes map to trees,
//! how rules are written, or how paths are evaluated. It fixes the contracts
//! engines must honor and the policy that turns their reports into one result.
//!
//! ## Architecture
//!
//! ```text
//! Diagnostic            ← severity + source stage + failure class
//!     │
//! Document              ← closed tagged-variant tree (element | text)
//!     │
//! SchemaHandle<C>       ← compiled once, shared by decode and encode
//!     │
//! stage traits          ← DataFormat, StructuralValidator, RuleValidator,
//!     │                   QueryEngine, TransformEngine
//! Pipeline              ← state machine + error policy
//!     │
//! PipelineResult        ← per-stage reports, status, round-trip verdict
//! ```

pub mod diagnostic;
pub mod document;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod result;
pub mod schema;
pub mod stage;
pub mod state;

pub use diagnostic::{Diagnostic, DiagnosticList, FailureClass, Produced, Severity, Stage, has_errors};
pub use document::{Attribute, Document, Element, Node, QName};
pub use error::{ConfigurationError, QueryError, TransformError};
pub use orchestrator::Pipeline;
pub use plan::{PipelineOptions, PipelinePlan, QuerySpec};
pub use result::{PipelineResult, RoundTrip, RunStatus, StageOutcome, StageReport};
pub use schema::{SchemaHandle, decode, encode};
pub use stage::{
    DataFormat, NamespaceBindings, QueryEngine, RuleValidator, Scalar, StructuralValidator,
    TransformEngine, ValidationReport,
};
pub use state::{FatalClass, PipelineState, StepVerdict};
