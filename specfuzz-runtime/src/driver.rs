use crate::error::Error;
use crate::synth::Synthesizer;
use crate::target::{CallResult, Resolver, Target, TargetId};
use specfuzz_spec::{parse_invocation, Invocation, TypeTag, Value};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// One completed call: what was called, with what, and what came back.
///
/// The text form is `name(arg, ...) -> result`, where everything before the arrow is itself a
/// directed invocation that replays the call with the same arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub function: String,
    pub args: Vec<Value>,
    pub ret: Option<TypeTag>,
    pub seed: u64,
    pub result: CallResult,
}

impl CallRecord {
    /// An invocation passing exactly the arguments this call used.
    pub fn invocation(&self) -> Invocation {
        Invocation::with_args(
            self.function.clone(),
            self.args.iter().map(Value::to_literal).collect(),
        )
    }
}

impl fmt::Display for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        for (ix, arg) in self.args.iter().enumerate() {
            if ix > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ") -> ")?;
        match (&self.result, &self.ret) {
            (CallResult::Value(v), Some(ret)) => write!(f, "{} = {}", ret, v),
            (result, _) => write!(f, "{}", result),
        }
    }
}

struct Loaded {
    id: TargetId,
    target: Arc<dyn Target>,
}

/// The driver session: at most one loaded target, shared by every connection.
///
/// Loading and calling both hold the slot's lock, so a call never sees a half-replaced target.
pub struct Driver {
    resolver: Box<dyn Resolver>,
    slot: Mutex<Option<Loaded>>,
}

impl Driver {
    pub fn new<R: Resolver + 'static>(resolver: R) -> Self {
        Driver {
            resolver: Box::new(resolver),
            slot: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Loaded>> {
        // a panic inside a target call leaves the slot itself consistent
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolve and load a target, replacing the current one.
    ///
    /// On failure the previously loaded target stays loaded.
    pub fn load(&self, id: TargetId) -> Result<(), Error> {
        let mut slot = self.slot();
        let target = self.resolver.resolve(&id).map_err(|e| {
            warn!(path = %id.path.display(), error = %e, "load failed");
            e
        })?;
        id.check(target.interface().and_then(|spec| spec.target.as_ref()))?;
        info!(path = %id.path.display(), target = %id, "target loaded");
        *slot = Some(Loaded { id, target });
        Ok(())
    }

    /// Drop the current target. Returns whether one was loaded.
    pub fn unload(&self) -> bool {
        match self.slot().take() {
            Some(loaded) => {
                info!(path = %loaded.id.path.display(), "target unloaded");
                true
            }
            None => false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.slot().is_some()
    }

    pub fn loaded_id(&self) -> Option<TargetId> {
        self.slot().as_ref().map(|loaded| loaded.id.clone())
    }

    /// The loaded target's interface in text form, or `None` if it has no interface.
    pub fn interface_text(&self) -> Result<Option<String>, Error> {
        let slot = self.slot();
        let loaded = slot.as_ref().ok_or(Error::NoTargetLoaded)?;
        Ok(loaded.target.interface().map(|spec| spec.to_string()))
    }

    /// Parse `text` as an invocation and perform it.
    ///
    /// Without a `seed`, arguments are synthesized from a fresh random one.
    pub fn call(&self, text: &str, seed: Option<u64>) -> Result<CallRecord, Error> {
        if !self.is_loaded() {
            return Err(Error::NoTargetLoaded);
        }
        let invocation = parse_invocation(text)?;
        self.invoke(&invocation, seed.unwrap_or_else(rand::random))
    }

    /// Synthesize arguments for `invocation` and call into the loaded target.
    pub fn invoke(&self, invocation: &Invocation, seed: u64) -> Result<CallRecord, Error> {
        let slot = self.slot();
        let loaded = slot.as_ref().ok_or(Error::NoTargetLoaded)?;
        let unknown = || Error::UnknownFunction(invocation.function.clone());
        let spec = loaded.target.interface().ok_or_else(unknown)?;
        let function = spec.function(&invocation.function).ok_or_else(unknown)?;

        let bound = spec.bind(invocation)?;
        let args = Synthesizer::new(spec, seed).arguments(&bound)?;
        debug!(function = %function.name, seed = seed, "invoking");

        let result = loaded.target.call(function, &args)?;
        let record = CallRecord {
            function: function.name.clone(),
            args,
            ret: function.ret.clone(),
            seed,
            result,
        };
        debug!(call = %record, "call completed");
        Ok(record)
    }
}
