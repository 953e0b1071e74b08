//! Argument values for a call, built from declarations, literals, and a seeded RNG.

use crate::error::Error;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use specfuzz_spec::{ArgumentSpec, InterfaceSpecification, Literal, ScalarType, TypeTag, Value};

/// Pointers nested deeper than this are always null.
const MAX_POINTER_DEPTH: usize = 16;

const MAX_STRING_LEN: usize = 64;

/// Synthesizes values for one call.
///
/// Each synthesizer owns its RNG, seeded at construction, so the same seed and declarations
/// always yield the same values.
pub struct Synthesizer<'a> {
    spec: &'a InterfaceSpecification,
    rng: StdRng,
}

/// Values for `args` in declared order.
pub fn synthesize(
    spec: &InterfaceSpecification,
    args: &[ArgumentSpec],
    seed: u64,
) -> Result<Vec<Value>, Error> {
    Synthesizer::new(spec, seed).arguments(args)
}

impl<'a> Synthesizer<'a> {
    pub fn new(spec: &'a InterfaceSpecification, seed: u64) -> Self {
        Synthesizer {
            spec,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn arguments(&mut self, args: &[ArgumentSpec]) -> Result<Vec<Value>, Error> {
        args.iter().map(|arg| self.argument(arg)).collect()
    }

    pub fn argument(&mut self, arg: &ArgumentSpec) -> Result<Value, Error> {
        self.value(&arg.type_, arg.literal.as_ref(), 0)
    }

    /// A value of `type_`. A complete literal is used as is; wildcards inside a record literal
    /// are synthesized field by field.
    pub fn value(
        &mut self,
        type_: &TypeTag,
        literal: Option<&Literal>,
        depth: usize,
    ) -> Result<Value, Error> {
        match literal {
            None | Some(Literal::Wildcard) => self.random(type_, depth),
            Some(lit) if lit.is_complete() => {
                Value::from_literal(lit, type_, self.spec).map_err(Error::Synthesis)
            }
            Some(Literal::Record(items)) => {
                let fields = self.fields(struct_name(type_), Some(items.as_slice()), depth)?;
                Ok(match type_ {
                    TypeTag::StructPtr(_) => Value::StructPtr(Some(fields)),
                    _ => Value::Struct(fields),
                })
            }
            Some(lit) => Value::from_literal(lit, type_, self.spec).map_err(Error::Synthesis),
        }
    }

    fn fields(
        &mut self,
        name: &str,
        items: Option<&[Literal]>,
        depth: usize,
    ) -> Result<Vec<Value>, Error> {
        let spec = self.spec;
        let def = spec.struct_(name).ok_or_else(|| {
            Error::Synthesis(specfuzz_spec::LiteralError::UnknownType(name.to_owned()))
        })?;
        if let Some(items) = items {
            if items.len() != def.fields.len() {
                return Err(Error::Synthesis(specfuzz_spec::LiteralError::Arity {
                    name: name.to_owned(),
                    expected: def.fields.len(),
                    found: items.len(),
                }));
            }
        }
        def.fields
            .iter()
            .enumerate()
            .map(|(ix, field)| {
                let literal = match items {
                    Some(items) => Some(items[ix].overlay(field.literal.as_ref())),
                    None => field.literal.clone(),
                };
                self.value(&field.type_, literal.as_ref(), depth)
            })
            .collect()
    }

    fn random(&mut self, type_: &TypeTag, depth: usize) -> Result<Value, Error> {
        Ok(match type_ {
            TypeTag::Scalar(scalar) => self.scalar(*scalar),
            TypeTag::Enum(name) => {
                let spec = self.spec;
                let variants = spec
                    .enum_(name)
                    .map(|e| e.variants.as_slice())
                    .unwrap_or(&[]);
                // a declared variant half the time, otherwise any i32
                match variants.choose(&mut self.rng) {
                    Some(v) if self.rng.gen_bool(0.5) => Value::Enum(v.value),
                    _ => Value::Enum(self.rng.gen()),
                }
            }
            TypeTag::Struct(name) => Value::Struct(self.fields(name, None, depth)?),
            TypeTag::StructPtr(name) => {
                if depth >= MAX_POINTER_DEPTH || self.rng.gen_bool(0.5) {
                    Value::StructPtr(None)
                } else {
                    Value::StructPtr(Some(self.fields(name, None, depth + 1)?))
                }
            }
        })
    }

    fn scalar(&mut self, scalar: ScalarType) -> Value {
        let rng = &mut self.rng;
        match scalar {
            ScalarType::Bool => Value::Bool(rng.gen()),
            ScalarType::Int8 => Value::I8(rng.gen()),
            ScalarType::Int16 => Value::I16(rng.gen()),
            ScalarType::Int32 => Value::I32(rng.gen()),
            ScalarType::Int64 => Value::I64(rng.gen()),
            ScalarType::Uint8 => Value::U8(rng.gen()),
            ScalarType::Uint16 => Value::U16(rng.gen()),
            ScalarType::Uint32 => Value::U32(rng.gen()),
            ScalarType::Uint64 => Value::U64(rng.gen()),
            // raw bit patterns reach NaNs, infinities, and subnormals
            ScalarType::Float => Value::F32(if rng.gen_bool(0.5) {
                f32::from_bits(rng.gen())
            } else {
                rng.gen_range(-1.0e9, 1.0e9)
            }),
            ScalarType::Double => Value::F64(if rng.gen_bool(0.5) {
                f64::from_bits(rng.gen())
            } else {
                rng.gen_range(-1.0e18, 1.0e18)
            }),
            ScalarType::String => {
                let len = rng.gen_range(0, MAX_STRING_LEN + 1);
                let s = (0..len)
                    .map(|_| {
                        if rng.gen_bool(0.9) {
                            rng.gen_range(0x20u8, 0x7f) as char
                        } else {
                            // control characters, but never NUL
                            rng.gen_range(0x01u8, 0x20) as char
                        }
                    })
                    .collect();
                Value::String(s)
            }
        }
    }
}

fn struct_name(type_: &TypeTag) -> &str {
    match type_ {
        TypeTag::Struct(name) | TypeTag::StructPtr(name) => name,
        TypeTag::Scalar(_) | TypeTag::Enum(_) => "",
    }
}
