//! Loading fuzz targets, synthesizing their arguments, and calling them.
//!
//! A [`Driver`](struct.Driver.html) owns the single currently loaded target. Targets are found
//! through a [`Resolver`](trait.Resolver.html): shared objects are opened with `dlopen` and called
//! through the platform C calling convention, while [`HostTarget`s](struct.HostTarget.html) wrap
//! Rust closures for embedding and tests.

#![deny(bare_trait_objects)]

#[macro_use]
pub mod error;
mod driver;
mod synth;
mod target;

pub use crate::driver::{CallRecord, Driver};
pub use crate::error::{Error, LoadError};
pub use crate::synth::{synthesize, Synthesizer};
pub use crate::target::{
    CallResult, HostTarget, HostTargetBuilder, Registry, Resolver, Target, TargetId,
};

#[cfg(all(unix, target_arch = "x86_64"))]
pub use crate::target::DlTarget;

pub use specfuzz_spec as spec;
