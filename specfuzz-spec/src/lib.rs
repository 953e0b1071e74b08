//! Declarative descriptions of a fuzz target's interface.
//!
//! An [`InterfaceSpecification`](struct.InterfaceSpecification.html) lists the functions a target
//! exports, the records and enumerations their arguments use, and optionally explicit literal
//! values to pass instead of random ones. Specifications are exchanged as text; this crate parses,
//! validates, and renders that text, and converts literals into typed [`Value`s](enum.Value.html).

#![deny(bare_trait_objects)]

pub mod error;
mod interface;
mod lexer;
mod parser;
mod types;
mod value;

pub use crate::error::{Error, LiteralError, ValidationError};
pub use crate::interface::{Invocation, InterfaceSpecification};
pub use crate::parser::ParseError;
pub use crate::types::{
    ArgumentSpec, EnumSpec, EnumVariant, FunctionSpec, Location, ScalarType, StructSpec,
    TargetHeader, TypeTag,
};
pub use crate::value::{Literal, Value};

use crate::parser::Parser;

/// Parse and validate the text form of an interface specification.
pub fn parse_interface(input: &str) -> Result<InterfaceSpecification, Error> {
    let mut parser = Parser::new(input);
    let decls = parser.match_decls()?;
    let spec = InterfaceSpecification::from_declarations(&decls)?;
    Ok(spec)
}

/// Parse the text of a single call, e.g. `doThing(5, "x")` or a bare `doThing`.
///
/// The invocation is not checked against any specification here; see
/// [`InterfaceSpecification::bind`](struct.InterfaceSpecification.html#method.bind).
pub fn parse_invocation(input: &str) -> Result<Invocation, Error> {
    let mut parser = Parser::new(input);
    Ok(parser.match_invocation()?)
}
