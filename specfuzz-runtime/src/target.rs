#[cfg(all(unix, target_arch = "x86_64"))]
mod dl;
mod host;

#[cfg(all(unix, target_arch = "x86_64"))]
pub use crate::target::dl::DlTarget;
pub use crate::target::host::{HostTarget, HostTargetBuilder};

use crate::error::{Error, LoadError};
use specfuzz_spec::{FunctionSpec, InterfaceSpecification, TargetHeader, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a load request asks for: where the target lives and how it must identify itself.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetId {
    pub path: PathBuf,
    pub class: i32,
    pub type_: i32,
    pub version: f32,
    /// An empty name matches any target name.
    pub name: String,
}

impl TargetId {
    pub fn new<P: Into<PathBuf>>(path: P, class: i32, type_: i32, version: f32) -> Self {
        TargetId {
            path: path.into(),
            class,
            type_,
            version,
            name: String::new(),
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Check the identity a target reports for itself against this request.
    ///
    /// Targets without a header cannot be checked and are accepted.
    pub fn check(&self, header: Option<&TargetHeader>) -> Result<(), LoadError> {
        let header = match header {
            Some(header) => header,
            None => {
                warn!(path = %self.path.display(), "target has no header; identity unchecked");
                return Ok(());
            }
        };
        let matches = header.class == self.class
            && header.type_ == self.type_
            && header.version == self.version
            && (self.name.is_empty() || header.name == self.name);
        if matches {
            Ok(())
        } else {
            Err(LoadError::Mismatch {
                requested: self.to_string(),
                found: format!(
                    "{:?} class {} type {} version {:?}",
                    header.name, header.class, header.type_, header.version
                ),
            })
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} class {} type {} version {:?}",
            self.name, self.class, self.type_, self.version
        )
    }
}

/// The outcome of one completed call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    Void,
    Value(Value),
    /// The target ran, but reported that the call failed.
    Failure(String),
}

impl fmt::Display for CallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallResult::Void => write!(f, "void"),
            CallResult::Value(v) => write!(f, "{}", v),
            CallResult::Failure(msg) => write!(f, "failed {:?}", msg),
        }
    }
}

/// A loaded module whose functions can be called.
///
/// Dropping the last reference to a target unloads it.
pub trait Target: Send + Sync {
    /// The interface the target was loaded with, if it has one.
    fn interface(&self) -> Option<&InterfaceSpecification>;

    /// Call `function` with `args`, which match its declaration in number and type.
    fn call(&self, function: &FunctionSpec, args: &[Value]) -> Result<CallResult, Error>;
}

/// Finds the target named by a load request.
///
/// Resolution is deterministic: the same request resolves to the same module every time.
pub trait Resolver: Send + Sync {
    fn resolve(&self, id: &TargetId) -> Result<Arc<dyn Target>, LoadError>;
}

/// Resolves targets registered in-process by path, and loads everything else as a shared object.
pub struct Registry {
    targets: HashMap<PathBuf, Arc<dyn Target>>,
    native: bool,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            targets: HashMap::new(),
            native: true,
        }
    }

    /// A registry that never falls back to loading shared objects.
    pub fn in_process_only() -> Self {
        Registry {
            targets: HashMap::new(),
            native: false,
        }
    }

    pub fn register<P: Into<PathBuf>>(&mut self, path: P, target: Arc<dyn Target>) -> &mut Self {
        self.targets.insert(path.into(), target);
        self
    }

    pub fn with_target<P: Into<PathBuf>>(mut self, path: P, target: Arc<dyn Target>) -> Self {
        self.register(path, target);
        self
    }

    fn load_native(&self, path: &Path) -> Result<Arc<dyn Target>, LoadError> {
        if !self.native {
            return Err(LoadError::DlError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no target registered at {}", path.display()),
            )));
        }
        native(path)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl Resolver for Registry {
    fn resolve(&self, id: &TargetId) -> Result<Arc<dyn Target>, LoadError> {
        if let Some(target) = self.targets.get(&id.path) {
            debug!(path = %id.path.display(), "resolved in-process target");
            return Ok(target.clone());
        }
        self.load_native(&id.path)
    }
}

#[cfg(all(unix, target_arch = "x86_64"))]
fn native(path: &Path) -> Result<Arc<dyn Target>, LoadError> {
    let target: Arc<dyn Target> = DlTarget::load(path)?;
    Ok(target)
}

#[cfg(not(all(unix, target_arch = "x86_64")))]
fn native(path: &Path) -> Result<Arc<dyn Target>, LoadError> {
    Err(LoadError::Unsupported(path.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, version: f32) -> TargetHeader {
        TargetHeader {
            name: name.to_owned(),
            class: 1,
            type_: 2,
            version,
        }
    }

    #[test]
    fn identity_check() {
        let id = TargetId::new("/mods/a.so", 1, 2, 1.0);
        assert!(id.check(Some(&header("alpha", 1.0))).is_ok());
        assert!(id.check(None).is_ok());
        assert!(matches!(
            id.check(Some(&header("alpha", 2.0))),
            Err(LoadError::Mismatch { .. })
        ));

        let named = id.with_name("alpha");
        assert!(named.check(Some(&header("alpha", 1.0))).is_ok());
        assert!(named.check(Some(&header("beta", 1.0))).is_err());
    }

    #[test]
    fn unregistered_paths_fail_without_native_fallback() {
        let registry = Registry::in_process_only();
        let err = registry
            .resolve(&TargetId::new("/mods/missing.so", 1, 2, 1.0))
            .err()
            .expect("nothing registered");
        assert!(matches!(err, LoadError::DlError(_)));
    }
}
