use crate::parser::ParseError;
use crate::types::{Location, ScalarType};
use thiserror::Error;

/// Errors from reading specification or invocation text.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}", _0)]
    ParseError(#[from] ParseError),
    #[error("{}", _0)]
    ValidationError(#[from] ValidationError),
}

#[derive(Debug, PartialEq, Eq, Clone, Error)]
pub enum ValidationError {
    #[error("Redefinition of name `{name}`")]
    NameAlreadyExists {
        name: String,
        at_location: Location,
        previous_location: Location,
    },
    #[error("Use of unknown name `{name}`")]
    NameNotFound { name: String, use_location: Location },
    #[error("Empty definition for `{name}`")]
    Empty { name: String, location: Location },
    #[error("Infinite definition for `{name}`")]
    Infinite { name: String, location: Location },
    #[error("Pointer to `{name}`, which is not a struct")]
    PointerToNonStruct { name: String, location: Location },
    #[error("More than one target header")]
    DuplicateHeader { location: Location },
    #[error("Bad literal at {location}: {error}")]
    Literal {
        error: LiteralError,
        location: Location,
    },
    #[error("`{function}` takes {expected} arguments, {found} given")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("Argument {index} of `{function}`: {error}")]
    Argument {
        function: String,
        index: usize,
        error: LiteralError,
    },
}

/// A literal that does not fit the type of its slot.
#[derive(Debug, PartialEq, Eq, Clone, Error)]
pub enum LiteralError {
    #[error("expected {expected} literal, found `{found}`")]
    Mismatch { expected: String, found: String },
    #[error("`{text}` is out of range for {type_}")]
    OutOfRange { text: String, type_: ScalarType },
    #[error("`{variant}` is not a variant of enum `{enum_}`")]
    UnknownVariant { enum_: String, variant: String },
    #[error("struct `{name}` has {expected} fields, literal has {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("unknown type `{}`", _0)]
    UnknownType(String),
    #[error("literal `{}` leaves values to be synthesized", _0)]
    Incomplete(String),
}
