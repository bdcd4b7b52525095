//! Runtime errors for the evaluator.

use crate::eval::Value;
use crate::store::Address;
use crate::trace::TraceError;

/// Every way a ScopeLang run can fail. None of these are recovered from:
/// the first one aborts the run and is handed back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),

    /// Read of a cell that was never written or has been released.
    #[error("internal error: undefined contents at {0}")]
    UndefinedContents(Address),

    #[error("internal error: pop from empty stack")]
    EmptyStack,

    #[error("{context} must be numeric, found {found}")]
    NonNumeric { context: &'static str, found: Value },

    #[error("divide by zero")]
    DivideByZero,

    #[error("type mismatch: cannot compare {lhs} with {rhs} using `is`")]
    TypeMismatch { lhs: Value, rhs: Value },

    #[error("{op} expects a pair, found {found}")]
    NotAPair { op: &'static str, found: Value },

    #[error("internal error: stack not empty at program end ({0} slot(s) still pushed)")]
    StackNotEmpty(usize),

    #[error("program must return a number, found {0}")]
    NonNumericResult(Value),

    #[error("failed to write program output: {0}")]
    Output(#[from] std::io::Error),

    #[error(transparent)]
    Trace(#[from] TraceError),
}

impl EvalError {
    /// True for faults that well-formed programs never trigger: they point
    /// at unbalanced stack handling rather than a mistake in the program.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            EvalError::UndefinedContents(_) | EvalError::EmptyStack | EvalError::StackNotEmpty(_)
        )
    }
}
