//! The orchestrator's state machine.
//!
//! ```text
//! Compiling → Decoding → Validating → Querying → Transforming → Encoding → Done
//!     │           │                                   │             │
//!     └───────────┴──────────────► Aborted ◄──────────┴─────────────┘
//! ```
//!
//! Validating and Querying never abort: their failures are recorded and the
//! machine moves on.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Compiling,
    Decoding,
    Validating,
    Querying,
    Transforming,
    Encoding,
    Done,
    Aborted,
}

/// How the work done in a state turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepVerdict {
    Passed,
    Failed,
}

/// Failure classes that end a run early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalClass {
    SchemaCompile,
    Decode,
    Transform,
    Encode,
}

impl FatalClass {
    /// Process exit code for this class.
    pub fn exit_code(self) -> i32 {
        match self {
            FatalClass::SchemaCompile => 1,
            FatalClass::Decode => 2,
            FatalClass::Transform => 3,
            FatalClass::Encode => 4,
        }
    }
}

impl fmt::Display for FatalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FatalClass::SchemaCompile => "schema_compile",
            FatalClass::Decode => "decode",
            FatalClass::Transform => "transform",
            FatalClass::Encode => "encode",
        })
    }
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted)
    }

    /// The class a failure in this state is recorded under, when fatal.
    pub fn fatal_class(self) -> Option<FatalClass> {
        match self {
            PipelineState::Compiling => Some(FatalClass::SchemaCompile),
            PipelineState::Decoding => Some(FatalClass::Decode),
            PipelineState::Transforming => Some(FatalClass::Transform),
            PipelineState::Encoding => Some(FatalClass::Encode),
            _ => None,
        }
    }

    /// Transition on the verdict of the work done in `self`.
    ///
    /// Terminal states absorb every verdict.
    pub fn next(self, verdict: StepVerdict) -> PipelineState {
        use PipelineState::*;

        if self.is_terminal() {
            return self;
        }
        if verdict == StepVerdict::Failed && self.fatal_class().is_some() {
            return Aborted;
        }
        match self {
            Compiling => Decoding,
            Decoding => Validating,
            Validating => Querying,
            Querying => Transforming,
            Transforming => Encoding,
            Encoding => Done,
            Done | Aborted => self,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineState::Compiling => "COMPILING",
            PipelineState::Decoding => "DECODING",
            PipelineState::Validating => "VALIDATING",
            PipelineState::Querying => "QUERYING",
            PipelineState::Transforming => "TRANSFORMING",
            PipelineState::Encoding => "ENCODING",
            PipelineState::Done => "DONE",
            PipelineState::Aborted => "ABORTED",
        })
    }
}
