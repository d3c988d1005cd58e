use crate::{Diagnostic, Diagnostics, Error, native::HandleKind};

/// Typed failures raised by the engine.
///
/// They travel as the root cause of an [`Error`], usually wrapped in context frames,
/// callers classify them with [`failure_kind`] or `error.downcast_ref::<Failure>()`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Failure {
    #[error("Could not allocate a {kind} handle: {}", Diagnostics(.diagnostics))]
    Allocation {
        kind: HandleKind,
        diagnostics: Vec<Diagnostic>,
    },
    #[error("{operation} failed: {}", Diagnostics(.diagnostics))]
    NativeCall {
        operation: &'static str,
        diagnostics: Vec<Diagnostic>,
    },
    #[error("Cannot bind parameter {index}: {reason}")]
    ParameterBind { index: usize, reason: String },
    #[error("Cannot decode column {column}: {reason}")]
    ResultDecode { column: usize, reason: String },
    #[error("Cannot {operation} a statement in state {state}")]
    State {
        operation: &'static str,
        state: String,
    },
    #[error("The operation was cancelled")]
    Cancelled,
    #[error("Could not load the bulk copy library: {reason}")]
    PluginLoad { reason: String },
    #[error("Unexpected failure: {0}")]
    Unknown(String),
}

impl Failure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Failure::Allocation { .. } | Failure::PluginLoad { .. } => FailureKind::Resource,
            Failure::NativeCall { .. } => FailureKind::Native,
            Failure::ParameterBind { .. } | Failure::ResultDecode { .. } => FailureKind::Marshal,
            Failure::State { .. } => FailureKind::State,
            Failure::Cancelled => FailureKind::Cancelled,
            Failure::Unknown(..) => FailureKind::Unknown,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Failure::Allocation { diagnostics, .. } | Failure::NativeCall { diagnostics, .. } => {
                diagnostics
            }
            _ => &[],
        }
    }

    pub fn state(operation: &'static str, state: impl ToString) -> Self {
        Failure::State {
            operation,
            state: state.to_string(),
        }
    }

    pub fn bind(index: usize, reason: impl Into<String>) -> Self {
        Failure::ParameterBind {
            index,
            reason: reason.into(),
        }
    }

    pub fn decode(column: usize, reason: impl Into<String>) -> Self {
        Failure::ResultDecode {
            column,
            reason: reason.into(),
        }
    }
}

/// Coarse classification delivered with every completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Native,
    Marshal,
    Resource,
    State,
    Cancelled,
    Unknown,
}

/// Classify an error by the first [`Failure`] in its chain.
pub fn failure_kind(error: &Error) -> FailureKind {
    find_failure(error)
        .map(Failure::kind)
        .unwrap_or(FailureKind::Unknown)
}

/// The first [`Failure`] in the chain of `error`.
pub fn find_failure(error: &Error) -> Option<&Failure> {
    error
        .downcast_ref::<Failure>()
        .or_else(|| error.chain().find_map(|e| e.downcast_ref::<Failure>()))
}
