use crate::error::{Error, LoadError};
use crate::target::{CallResult, Target};
use specfuzz_spec::{parse_interface, FunctionSpec, InterfaceSpecification, Value};
use std::collections::HashMap;
use std::sync::Arc;

type HostFn = Box<dyn Fn(&[Value]) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// A target implemented by Rust closures in the current process.
///
/// A closure returns `Ok(None)` for void functions and `Ok(Some(value))` otherwise; an `Err`
/// becomes a `CallResult::Failure`.
pub struct HostTarget {
    interface: Option<InterfaceSpecification>,
    functions: HashMap<String, HostFn>,
}

impl HostTarget {
    pub fn builder() -> HostTargetBuilder {
        HostTargetBuilder::new()
    }
}

impl Target for HostTarget {
    fn interface(&self) -> Option<&InterfaceSpecification> {
        self.interface.as_ref()
    }

    fn call(&self, function: &FunctionSpec, args: &[Value]) -> Result<CallResult, Error> {
        let f = match self.functions.get(&function.name) {
            Some(f) => f,
            None => invocation_bail!("no implementation for `{}`", function.name),
        };
        match f(args) {
            Ok(None) if function.ret.is_none() => Ok(CallResult::Void),
            Ok(Some(v)) => match (&function.ret, &self.interface) {
                (Some(ret), Some(spec)) if v.is_a(ret, spec) => Ok(CallResult::Value(v)),
                (ret, _) => invocation_bail!(
                    "`{}` returned {}, declared {}",
                    function.name,
                    v,
                    ret.as_ref().map_or("void".to_owned(), |r| r.to_string())
                ),
            },
            Ok(None) => invocation_bail!("`{}` returned nothing", function.name),
            Err(e) => Ok(CallResult::Failure(e.to_string())),
        }
    }
}

pub struct HostTargetBuilder {
    interface: Option<InterfaceSpecification>,
    functions: HashMap<String, HostFn>,
}

impl HostTargetBuilder {
    pub fn new() -> Self {
        HostTargetBuilder {
            interface: None,
            functions: HashMap::new(),
        }
    }

    pub fn with_interface(mut self, interface: InterfaceSpecification) -> Self {
        self.interface = Some(interface);
        self
    }

    /// Parse `text` as the target's interface.
    pub fn with_interface_text(self, text: &str) -> Result<Self, LoadError> {
        let interface = parse_interface(text).map_err(LoadError::Interface)?;
        Ok(self.with_interface(interface))
    }

    pub fn with_function<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_owned(), Box::new(f));
        self
    }

    /// Every implemented function must be declared in the interface.
    pub fn build(self) -> Result<Arc<HostTarget>, LoadError> {
        for name in self.functions.keys() {
            let declared = self
                .interface
                .as_ref()
                .map_or(false, |spec| spec.function(name).is_some());
            if !declared {
                return Err(incorrect_target!(
                    "implemented function `{}` is not declared",
                    name
                ));
            }
        }
        Ok(Arc::new(HostTarget {
            interface: self.interface,
            functions: self.functions,
        }))
    }
}

impl Default for HostTargetBuilder {
    fn default() -> Self {
        HostTargetBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    fn target() -> Arc<HostTarget> {
        HostTarget::builder()
            .with_interface_text("add(int32, int32)->int32;\nlog(string);\nbad()->int32;\nfail();")
            .expect("valid interface")
            .with_function("add", |args| match args {
                [Value::I32(a), Value::I32(b)] => Ok(Some(Value::I32(a.wrapping_add(*b)))),
                _ => bail!("bad arguments"),
            })
            .with_function("log", |_| Ok(None))
            .with_function("bad", |_| Ok(Some(Value::Bool(true))))
            .with_function("fail", |_| bail!("device busy"))
            .build()
            .expect("all functions declared")
    }

    fn call(target: &HostTarget, name: &str, args: &[Value]) -> Result<CallResult, Error> {
        let function = target
            .interface()
            .and_then(|spec| spec.function(name))
            .expect("declared")
            .clone();
        target.call(&function, args)
    }

    #[test]
    fn results() {
        let target = target();
        assert_eq!(
            call(&target, "add", &[Value::I32(2), Value::I32(40)]).expect("call completes"),
            CallResult::Value(Value::I32(42))
        );
        assert_eq!(
            call(&target, "log", &[Value::from("hi")]).expect("call completes"),
            CallResult::Void
        );
        assert_eq!(
            call(&target, "fail", &[]).expect("call completes"),
            CallResult::Failure("device busy".to_owned())
        );
        assert!(matches!(
            call(&target, "bad", &[]),
            Err(Error::InvocationError(_))
        ));
    }

    #[test]
    fn undeclared_functions_are_rejected() {
        let res = HostTarget::builder()
            .with_interface_text("f();")
            .expect("valid interface")
            .with_function("g", |_| Ok(None))
            .build();
        assert!(matches!(res, Err(LoadError::IncorrectTarget(_))));
    }
}
