//! Messages exchanged between the control client and the driver.
//!
//! The protocol is strictly half-duplex: every request except `Exit` is answered by exactly one
//! response before the next request is read.

use serde::{Deserialize, Serialize};
use specfuzz_runtime::{Error as RuntimeError, LoadError, TargetId};
use std::fmt;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub path: String,
    pub class: i32,
    pub type_: i32,
    pub version: f32,
    /// Empty to accept any target name.
    pub name: String,
}

impl From<LoadRequest> for TargetId {
    fn from(req: LoadRequest) -> TargetId {
        TargetId::new(req.path, req.class, req.type_, req.version).with_name(req.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Load(LoadRequest),
    /// An invocation in text form, e.g. `doThing(5, _)` or a bare `doThing`.
    Call {
        text: String,
        seed: Option<u64>,
    },
    Status(i32),
    ListFunctions,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Load,
    NoTargetLoaded,
    UnknownFunction,
    Invocation,
    Synthesis,
    /// Malformed invocation text.
    Spec,
    /// The request itself could not be decoded.
    Decode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl From<&RuntimeError> for ErrorReport {
    fn from(e: &RuntimeError) -> ErrorReport {
        let kind = match e {
            RuntimeError::LoadError(_) => ErrorKind::Load,
            RuntimeError::NoTargetLoaded => ErrorKind::NoTargetLoaded,
            RuntimeError::UnknownFunction(_) => ErrorKind::UnknownFunction,
            RuntimeError::InvocationError(_) => ErrorKind::Invocation,
            RuntimeError::Synthesis(_) => ErrorKind::Synthesis,
            RuntimeError::Spec(_) => ErrorKind::Spec,
        };
        ErrorReport {
            kind,
            message: e.to_string(),
        }
    }
}

impl From<&LoadError> for ErrorReport {
    fn from(e: &LoadError) -> ErrorReport {
        ErrorReport {
            kind: ErrorKind::Load,
            message: e.to_string(),
        }
    }
}

/// The common body of every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// `SUCCESS` or `FAILURE`.
    pub code: i32,
    /// Text results, in order. Empty when there is nothing to report.
    pub output: Vec<String>,
    pub error: Option<ErrorReport>,
}

impl Reply {
    pub fn ok() -> Self {
        Reply {
            code: SUCCESS,
            output: Vec::new(),
            error: None,
        }
    }

    pub fn with_output<S: Into<String>>(output: S) -> Self {
        Reply {
            code: SUCCESS,
            output: vec![output.into()],
            error: None,
        }
    }

    pub fn failure(error: ErrorReport) -> Self {
        Reply {
            code: FAILURE,
            output: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS
    }

    /// All output fields, concatenated.
    pub fn output_text(&self) -> String {
        self.output.concat()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Load(Reply),
    Call(Reply),
    Status(Reply),
    ListFunctions(Reply),
    /// The request could not be decoded.
    Rejected(Reply),
}

impl Response {
    pub fn reply(&self) -> &Reply {
        match self {
            Response::Load(r)
            | Response::Call(r)
            | Response::Status(r)
            | Response::ListFunctions(r)
            | Response::Rejected(r) => r,
        }
    }

    pub fn into_reply(self) -> Reply {
        match self {
            Response::Load(r)
            | Response::Call(r)
            | Response::Status(r)
            | Response::ListFunctions(r)
            | Response::Rejected(r) => r,
        }
    }
}
