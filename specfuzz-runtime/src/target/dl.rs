use crate::error::{Error, LoadError};
use crate::target::{CallResult, Target};
use libc::{c_char, c_void};
use libloading::{Library, Symbol};
use specfuzz_spec::{
    parse_interface, FunctionSpec, InterfaceSpecification, ScalarType, StructSpec, TypeTag, Value,
};
use std::ffi::{CStr, CString};
use std::mem;
use std::path::Path;
use std::ptr;
use std::slice;
use std::str;
use std::sync::Arc;
use tracing::{debug, info};

/// Integer-class arguments go in `rdi`, `rsi`, `rdx`, `rcx`, `r8`, `r9`.
const GP_ARG_REGS: usize = 6;
/// Floating point arguments go in `xmm0` through `xmm7`.
const FP_ARG_REGS: usize = 8;

/// Returned struct pointers are followed no deeper than this.
const MAX_READ_DEPTH: usize = 16;

/// Every argument register filled; the callee reads only the ones its signature uses.
type GpFn = unsafe extern "C" fn(
    u64, u64, u64, u64, u64, u64, f64, f64, f64, f64, f64, f64, f64, f64,
) -> u64;
type FpFn = unsafe extern "C" fn(
    u64, u64, u64, u64, u64, u64, f64, f64, f64, f64, f64, f64, f64, f64,
) -> f64;

/// A fuzz target backed by a dynamically-loaded shared object.
///
/// The object exports its interface text as the byte array `specfuzz_interface`, with its length
/// in `specfuzz_interface_len`, and each declared function as an unmangled C symbol.
pub struct DlTarget {
    lib: Library,
    interface: InterfaceSpecification,
}

impl DlTarget {
    /// Load a target from a shared object on the filesystem.
    pub fn load<P: AsRef<Path>>(so_path: P) -> Result<Arc<Self>, LoadError> {
        let abs_so_path = so_path.as_ref().canonicalize()?;
        let lib = Library::new(abs_so_path.as_os_str())?;

        let text: &[u8] = unsafe {
            let text_ptr = lib.get::<*const u8>(b"specfuzz_interface").map_err(|e| {
                incorrect_target!("error loading required symbol `specfuzz_interface`: {}", e)
            })?;
            let text_len = lib.get::<*const usize>(b"specfuzz_interface_len").map_err(|e| {
                incorrect_target!(
                    "error loading required symbol `specfuzz_interface_len`: {}",
                    e
                )
            })?;
            if text_ptr.is_null() || text_len.is_null() {
                return Err(incorrect_target!("interface symbols are defined but null"));
            }
            slice::from_raw_parts(*text_ptr, **text_len)
        };
        let text = str::from_utf8(text)
            .map_err(|e| incorrect_target!("interface text is not UTF-8: {}", e))?;
        let interface = parse_interface(text).map_err(LoadError::Interface)?;
        match interface.target {
            Some(ref header) => info!(
                path = %abs_so_path.display(),
                name = %header.name,
                functions = interface.functions.len(),
                "loaded native target"
            ),
            None => return Err(incorrect_target!("interface has no target header")),
        }

        Ok(Arc::new(DlTarget { lib, interface }))
    }

    fn symbol(&self, name: &str) -> Result<*const c_void, Error> {
        let sym: Symbol<'_, *const c_void> =
            unsafe { self.lib.get(name.as_bytes()) }.map_err(|e| {
                Error::InvocationError(format!("error loading symbol `{}`: {}", name, e))
            })?;
        Ok(*sym)
    }
}

impl Target for DlTarget {
    fn interface(&self) -> Option<&InterfaceSpecification> {
        Some(&self.interface)
    }

    fn call(&self, function: &FunctionSpec, args: &[Value]) -> Result<CallResult, Error> {
        check_signature(function)?;
        let func = self.symbol(&function.name)?;
        debug!(function = %function.name, "calling native function");
        // `self.lib` stays loaded for the duration of the call
        unsafe { call_native(func, function, args, &self.interface) }
    }
}

/// Reject signatures that cannot be passed entirely in registers.
fn check_signature(function: &FunctionSpec) -> Result<(), Error> {
    let (mut gp, mut fp) = (0, 0);
    for arg in &function.args {
        match arg.type_ {
            TypeTag::Struct(ref name) => invocation_bail!(
                "`{}` takes struct `{}` by value; only struct pointers are supported",
                function.name,
                name
            ),
            TypeTag::Scalar(s) if s.is_float() => fp += 1,
            _ => gp += 1,
        }
    }
    if gp > GP_ARG_REGS || fp > FP_ARG_REGS {
        invocation_bail!(
            "`{}` needs {} integer and {} floating point argument registers; \
             at most {} and {} are supported",
            function.name,
            gp,
            fp,
            GP_ARG_REGS,
            FP_ARG_REGS
        );
    }
    if let Some(TypeTag::Struct(ref name)) = function.ret {
        invocation_bail!("`{}` returns struct `{}` by value", function.name, name);
    }
    Ok(())
}

/// Register representation of a `Value`.
enum RegVal {
    GpReg(u64),
    FpReg(f64),
}

/// Call `func` as `function`, passing `args` in argument registers.
///
/// Strings and structs passed by pointer live until the call returns.
unsafe fn call_native(
    func: *const c_void,
    function: &FunctionSpec,
    args: &[Value],
    spec: &InterfaceSpecification,
) -> Result<CallResult, Error> {
    check_signature(function)?;
    if args.len() != function.args.len() {
        invocation_bail!(
            "`{}` takes {} arguments, {} given",
            function.name,
            function.args.len(),
            args.len()
        );
    }

    let mut frame = Frame::new(spec);
    let mut gp = [0u64; GP_ARG_REGS];
    let mut fp = [0f64; FP_ARG_REGS];
    let (mut gp_count, mut fp_count) = (0, 0);
    for (value, decl) in args.iter().zip(function.args.iter()) {
        match frame.to_reg(value, &decl.type_)? {
            RegVal::GpReg(v) => {
                gp[gp_count] = v;
                gp_count += 1;
            }
            RegVal::FpReg(v) => {
                fp[fp_count] = v;
                fp_count += 1;
            }
        }
    }

    macro_rules! call_with_regs {
        ($ty:ty) => {{
            let f = mem::transmute::<*const c_void, $ty>(func);
            f(
                gp[0], gp[1], gp[2], gp[3], gp[4], gp[5], fp[0], fp[1], fp[2], fp[3], fp[4],
                fp[5], fp[6], fp[7],
            )
        }};
    }

    let value = match function.ret {
        None => {
            call_with_regs!(GpFn);
            return Ok(CallResult::Void);
        }
        Some(TypeTag::Scalar(ScalarType::Float)) => {
            let r = call_with_regs!(FpFn);
            // the low half of `xmm0`
            Value::F32(f32::from_bits(r.to_bits() as u32))
        }
        Some(TypeTag::Scalar(ScalarType::Double)) => Value::F64(call_with_regs!(FpFn)),
        Some(ref ret) => {
            let r = call_with_regs!(GpFn);
            from_gp_reg(r, ret, spec)?
        }
    };
    Ok(CallResult::Value(value))
}

unsafe fn from_gp_reg(
    r: u64,
    type_: &TypeTag,
    spec: &InterfaceSpecification,
) -> Result<Value, Error> {
    Ok(match type_ {
        TypeTag::Scalar(scalar) => match scalar {
            ScalarType::Bool => Value::Bool(r as u8 != 0),
            ScalarType::Int8 => Value::I8(r as u8 as i8),
            ScalarType::Int16 => Value::I16(r as u16 as i16),
            ScalarType::Int32 => Value::I32(r as u32 as i32),
            ScalarType::Int64 => Value::I64(r as i64),
            ScalarType::Uint8 => Value::U8(r as u8),
            ScalarType::Uint16 => Value::U16(r as u16),
            ScalarType::Uint32 => Value::U32(r as u32),
            ScalarType::Uint64 => Value::U64(r),
            ScalarType::String => Value::String(read_c_str(r as usize)),
            ScalarType::Float | ScalarType::Double => {
                invocation_bail!("floating point value read from an integer register")
            }
        },
        TypeTag::Enum(_) => Value::Enum(r as u32 as i32),
        TypeTag::StructPtr(name) => read_struct_ptr(r as usize, name, spec, 0)?,
        TypeTag::Struct(name) => invocation_bail!("struct `{}` returned by value", name),
    })
}

/// Null strings read as empty.
unsafe fn read_c_str(p: usize) -> String {
    if p == 0 {
        String::new()
    } else {
        CStr::from_ptr(p as *const c_char)
            .to_string_lossy()
            .into_owned()
    }
}

unsafe fn read_struct_ptr(
    p: usize,
    name: &str,
    spec: &InterfaceSpecification,
    depth: usize,
) -> Result<Value, Error> {
    if p == 0 || depth >= MAX_READ_DEPTH {
        return Ok(Value::StructPtr(None));
    }
    let layout = StructLayout::of(name, spec)?;
    Ok(Value::StructPtr(Some(read_fields(
        p as *const u8,
        &layout,
        spec,
        depth + 1,
    )?)))
}

unsafe fn read_fields(
    base: *const u8,
    layout: &StructLayout<'_>,
    spec: &InterfaceSpecification,
    depth: usize,
) -> Result<Vec<Value>, Error> {
    let mut values = Vec::with_capacity(layout.offsets.len());
    for (field, offset) in layout.def.fields.iter().zip(layout.offsets.iter()) {
        let p = base.add(*offset);
        values.push(match field.type_ {
            TypeTag::Scalar(scalar) => match scalar {
                ScalarType::Bool => Value::Bool(ptr::read_unaligned(p) != 0),
                ScalarType::Int8 => Value::I8(ptr::read_unaligned(p as *const i8)),
                ScalarType::Int16 => Value::I16(ptr::read_unaligned(p as *const i16)),
                ScalarType::Int32 => Value::I32(ptr::read_unaligned(p as *const i32)),
                ScalarType::Int64 => Value::I64(ptr::read_unaligned(p as *const i64)),
                ScalarType::Uint8 => Value::U8(ptr::read_unaligned(p)),
                ScalarType::Uint16 => Value::U16(ptr::read_unaligned(p as *const u16)),
                ScalarType::Uint32 => Value::U32(ptr::read_unaligned(p as *const u32)),
                ScalarType::Uint64 => Value::U64(ptr::read_unaligned(p as *const u64)),
                ScalarType::Float => Value::F32(ptr::read_unaligned(p as *const f32)),
                ScalarType::Double => Value::F64(ptr::read_unaligned(p as *const f64)),
                ScalarType::String => {
                    Value::String(read_c_str(ptr::read_unaligned(p as *const usize)))
                }
            },
            TypeTag::Enum(_) => Value::Enum(ptr::read_unaligned(p as *const i32)),
            TypeTag::Struct(ref name) => {
                let inner = StructLayout::of(name, spec)?;
                Value::Struct(read_fields(p, &inner, spec, depth)?)
            }
            TypeTag::StructPtr(ref name) => {
                read_struct_ptr(ptr::read_unaligned(p as *const usize), name, spec, depth)?
            }
        });
    }
    Ok(values)
}

/// Field offsets of a struct under C layout rules.
struct StructLayout<'a> {
    def: &'a StructSpec,
    offsets: Vec<usize>,
    size: usize,
    align: usize,
}

fn round_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) / align * align
}

impl<'a> StructLayout<'a> {
    fn of(name: &str, spec: &'a InterfaceSpecification) -> Result<Self, Error> {
        let def = match spec.struct_(name) {
            Some(def) => def,
            None => invocation_bail!("unknown struct `{}`", name),
        };
        let mut offsets = Vec::with_capacity(def.fields.len());
        let (mut offset, mut align) = (0, 1);
        for field in &def.fields {
            let (field_size, field_align) = size_align(&field.type_, spec)?;
            offset = round_up(offset, field_align);
            offsets.push(offset);
            offset += field_size;
            align = align.max(field_align);
        }
        Ok(StructLayout {
            def,
            offsets,
            size: round_up(offset, align),
            align,
        })
    }
}

fn size_align(type_: &TypeTag, spec: &InterfaceSpecification) -> Result<(usize, usize), Error> {
    Ok(match type_ {
        TypeTag::Scalar(scalar) => match scalar {
            ScalarType::Bool | ScalarType::Int8 | ScalarType::Uint8 => (1, 1),
            ScalarType::Int16 | ScalarType::Uint16 => (2, 2),
            ScalarType::Int32 | ScalarType::Uint32 | ScalarType::Float => (4, 4),
            ScalarType::Int64 | ScalarType::Uint64 | ScalarType::Double | ScalarType::String => {
                (8, 8)
            }
        },
        TypeTag::Enum(_) => (4, 4),
        TypeTag::StructPtr(_) => (8, 8),
        TypeTag::Struct(name) => {
            let layout = StructLayout::of(name, spec)?;
            (layout.size, layout.align)
        }
    })
}

fn struct_name(type_: &TypeTag) -> Result<&str, Error> {
    match type_ {
        TypeTag::Struct(name) | TypeTag::StructPtr(name) => Ok(name),
        other => invocation_bail!("record value for non-struct type {}", other),
    }
}

/// Memory that outlives marshaling and must stay put until the call returns.
struct Frame<'a> {
    spec: &'a InterfaceSpecification,
    strings: Vec<CString>,
    buffers: Vec<Box<[u64]>>,
}

impl<'a> Frame<'a> {
    fn new(spec: &'a InterfaceSpecification) -> Self {
        Frame {
            spec,
            strings: Vec::new(),
            buffers: Vec::new(),
        }
    }

    fn to_reg(&mut self, value: &Value, type_: &TypeTag) -> Result<RegVal, Error> {
        use self::RegVal::*;
        Ok(match *value {
            Value::Bool(v) => GpReg(v as u64),
            Value::I8(v) => GpReg(v as u64),
            Value::I16(v) => GpReg(v as u64),
            Value::I32(v) => GpReg(v as u64),
            Value::I64(v) => GpReg(v as u64),
            Value::U8(v) => GpReg(v as u64),
            Value::U16(v) => GpReg(v as u64),
            Value::U32(v) => GpReg(v as u64),
            Value::U64(v) => GpReg(v),
            Value::Enum(v) => GpReg(v as u64),
            Value::F32(v) => FpReg(f64::from_bits(u64::from(v.to_bits()))),
            Value::F64(v) => FpReg(v),
            Value::String(ref s) => GpReg(self.c_string(s)? as u64),
            Value::StructPtr(None) => GpReg(0),
            Value::StructPtr(Some(ref fields)) => {
                GpReg(self.struct_ptr(struct_name(type_)?, fields)? as u64)
            }
            Value::Struct(_) => invocation_bail!("struct arguments are passed by pointer"),
        })
    }

    fn c_string(&mut self, s: &str) -> Result<usize, Error> {
        let c = CString::new(s).map_err(|e| {
            Error::InvocationError(format!("string argument contains NUL: {}", e))
        })?;
        let p = c.as_ptr() as usize;
        self.strings.push(c);
        Ok(p)
    }

    fn struct_ptr(&mut self, name: &str, fields: &[Value]) -> Result<usize, Error> {
        let spec = self.spec;
        let layout = StructLayout::of(name, spec)?;
        let words = (layout.size + 7) / 8;
        let mut buf = vec![0u64; words.max(1)].into_boxed_slice();
        let base = buf.as_mut_ptr() as *mut u8;
        unsafe { self.write_fields(base, &layout, fields)? };
        self.buffers.push(buf);
        Ok(base as usize)
    }

    unsafe fn write_fields(
        &mut self,
        base: *mut u8,
        layout: &StructLayout<'_>,
        fields: &[Value],
    ) -> Result<(), Error> {
        if fields.len() != layout.def.fields.len() {
            invocation_bail!(
                "struct `{}` has {} fields, value has {}",
                layout.def.name,
                layout.def.fields.len(),
                fields.len()
            );
        }
        for ((decl, offset), value) in layout
            .def
            .fields
            .iter()
            .zip(layout.offsets.iter())
            .zip(fields.iter())
        {
            let p = base.add(*offset);
            match *value {
                Value::Bool(v) => ptr::write_unaligned(p, v as u8),
                Value::I8(v) => ptr::write_unaligned(p as *mut i8, v),
                Value::I16(v) => ptr::write_unaligned(p as *mut i16, v),
                Value::I32(v) => ptr::write_unaligned(p as *mut i32, v),
                Value::I64(v) => ptr::write_unaligned(p as *mut i64, v),
                Value::U8(v) => ptr::write_unaligned(p, v),
                Value::U16(v) => ptr::write_unaligned(p as *mut u16, v),
                Value::U32(v) => ptr::write_unaligned(p as *mut u32, v),
                Value::U64(v) => ptr::write_unaligned(p as *mut u64, v),
                Value::F32(v) => ptr::write_unaligned(p as *mut f32, v),
                Value::F64(v) => ptr::write_unaligned(p as *mut f64, v),
                Value::Enum(v) => ptr::write_unaligned(p as *mut i32, v),
                Value::String(ref s) => {
                    let c = self.c_string(s)?;
                    ptr::write_unaligned(p as *mut usize, c)
                }
                Value::StructPtr(None) => ptr::write_unaligned(p as *mut usize, 0),
                Value::StructPtr(Some(ref inner)) => {
                    let inner = self.struct_ptr(struct_name(&decl.type_)?, inner)?;
                    ptr::write_unaligned(p as *mut usize, inner)
                }
                Value::Struct(ref inner) => {
                    let spec = self.spec;
                    let inner_layout = StructLayout::of(struct_name(&decl.type_)?, spec)?;
                    self.write_fields(p, &inner_layout, inner)?
                }
            }
        }
        Ok(())
    }
}
