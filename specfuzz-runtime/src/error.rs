use specfuzz_spec::{LiteralError, ValidationError};
use std::path::PathBuf;
use thiserror::Error;

/// Driver runtime errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested target could not be loaded; the previous target, if any, is still loaded.
    #[error("Load error: {}", _0)]
    LoadError(#[from] LoadError),

    /// A call or function listing arrived before any target was loaded.
    #[error("No target loaded")]
    NoTargetLoaded,

    /// The loaded target's interface has no function by this name.
    #[error("Unknown function: {}", _0)]
    UnknownFunction(String),

    /// The call could not be completed, for example because an argument cannot be passed through
    /// the target's calling convention.
    #[error("Invocation error: {}", _0)]
    InvocationError(String),

    #[error("Synthesis error: {}", _0)]
    Synthesis(#[source] LiteralError),

    /// The invocation text was malformed or did not match the function's declaration.
    #[error("{}", _0)]
    Spec(#[from] specfuzz_spec::Error),
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Error {
        Error::Spec(e.into())
    }
}

/// Reasons a target could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    /// IO errors arising during dynamic loading.
    #[error("Dynamic loading error: {}", _0)]
    DlError(#[from] std::io::Error),

    /// The target was found, but does not look like a fuzz target.
    #[error("Incorrect target definition: {}", _0)]
    IncorrectTarget(String),

    /// The interface embedded in the target failed to parse or validate.
    #[error("Bad target interface: {}", _0)]
    Interface(#[source] specfuzz_spec::Error),

    /// The target identifies itself differently than requested.
    #[error("Target mismatch: requested {requested}, found {found}")]
    Mismatch { requested: String, found: String },

    #[error("Native targets are not supported on this platform: {}", _0.display())]
    Unsupported(PathBuf),
}

#[macro_export]
macro_rules! incorrect_target {
    ($($arg:tt)*) => {
        $crate::error::LoadError::IncorrectTarget(format!($($arg)*))
    }
}

#[macro_export]
macro_rules! invocation_bail {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::InvocationError(format!($($arg)*)))
    }
}
