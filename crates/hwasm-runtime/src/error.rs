//! Runtime errors

use thiserror::Error;

/// Runtime result type
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime errors
///
/// Covers binding failures (undefined or duplicate names), lifecycle
/// violations (structural mutation after start), and runtime stack faults.
/// All of them indicate a defect in the source program or its host wiring;
/// none are recoverable within a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("stack is empty")]
    StackUnderflow,

    #[error("'{0}' is not defined")]
    Undefined(String),

    #[error("reg '{0}' is already defined")]
    RegAlreadyDefined(String),

    #[error("arr '{0}' is already defined")]
    ArrAlreadyDefined(String),

    #[error("label '{0}' is already defined")]
    LabelAlreadyDefined(String),

    #[error("external call by index={0} is not defined")]
    ExternalNotDefined(i32),

    #[error("label '{label}' resolves to an external call and cannot be a jump target")]
    JumpToExternal { label: String },

    #[error("cannot {action} after the interpreter has been started")]
    AfterStart { action: String },

    #[error("interpreter is already running")]
    AlreadyStarted,

    #[error("interpreter is not started")]
    NotStarted,

    #[error("external call frame failed: {0}")]
    ExternalCall(String),
}

impl Error {
    /// Lifecycle violation: a configuration operation arrived after start.
    pub fn after_start(action: impl Into<String>) -> Self {
        Error::AfterStart {
            action: action.into(),
        }
    }
}
