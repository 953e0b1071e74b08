//! Literal syntax and the typed values it denotes.

use crate::error::LiteralError;
use crate::interface::InterfaceSpecification;
use crate::types::{ScalarType, TypeTag};
use std::convert::TryFrom;
use std::fmt;

/// An explicit value as written in specification or invocation text.
///
/// Literals are untyped; they only become [`Value`s](enum.Value.html) once checked against the
/// declared type of the slot they fill.
#[derive(Debug, PartialEq, Clone)]
pub enum Literal {
    /// Integer or floating point text, kept verbatim so it can be parsed at the width of its slot.
    Number(String),
    Bool(bool),
    Str(String),
    /// An enum variant name, or one of the float spellings `inf` and `nan`.
    Ident(String),
    Null,
    /// Field values of a struct, in declaration order.
    Record(Vec<Literal>),
    /// `_`: leave this slot to the synthesizer.
    Wildcard,
}

impl Literal {
    /// True if no part of this literal is left to the synthesizer.
    pub fn is_complete(&self) -> bool {
        match self {
            Literal::Wildcard => false,
            Literal::Record(items) => items.iter().all(Literal::is_complete),
            _ => true,
        }
    }

    /// Layer `self` over `base`: wildcards in `self` fall back to the matching part of `base`.
    pub fn overlay(&self, base: Option<&Literal>) -> Literal {
        match (self, base) {
            (Literal::Wildcard, Some(base)) => base.clone(),
            (Literal::Record(top), Some(Literal::Record(bottom))) if top.len() == bottom.len() => {
                Literal::Record(
                    top.iter()
                        .zip(bottom.iter())
                        .map(|(t, b)| t.overlay(Some(b)))
                        .collect(),
                )
            }
            (lit, _) => lit.clone(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(text) => write!(f, "{}", text),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Str(s) => write_quoted(f, s),
            Literal::Ident(name) => write!(f, "{}", name),
            Literal::Null => write!(f, "null"),
            Literal::Record(items) => write_record(f, items),
            Literal::Wildcard => write!(f, "_"),
        }
    }
}

/// A concrete, typed argument or return value.
#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    /// Enums are carried by their raw value, which need not name a declared variant.
    Enum(i32),
    Struct(Vec<Value>),
    StructPtr(Option<Vec<Value>>),
}

macro_rules! impl_from_scalars {
    ( { $( $ctor:ident : $ty:ty ),* } ) => {
        $(
            impl From<$ty> for Value {
                fn from(x: $ty) -> Value {
                    Value::$ctor(x)
                }
            }
        )*
    };
}

impl_from_scalars!({
    Bool: bool,
    I8: i8,
    I16: i16,
    I32: i32,
    I64: i64,
    U8: u8,
    U16: u16,
    U32: u32,
    U64: u64,
    F32: f32,
    F64: f64,
    String: String
});

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::String(s.to_owned())
    }
}

impl Value {
    /// Check `literal` against `type_` and produce the value it denotes.
    ///
    /// Fails with `LiteralError::Incomplete` if any part of the literal is a wildcard.
    pub fn from_literal(
        literal: &Literal,
        type_: &TypeTag,
        spec: &InterfaceSpecification,
    ) -> Result<Value, LiteralError> {
        typed(literal, type_, spec)?.ok_or_else(|| LiteralError::Incomplete(literal.to_string()))
    }

    /// Check that `literal` fits `type_`, allowing wildcards anywhere.
    pub fn check_literal(
        literal: &Literal,
        type_: &TypeTag,
        spec: &InterfaceSpecification,
    ) -> Result<(), LiteralError> {
        typed(literal, type_, spec).map(|_| ())
    }

    /// The literal that denotes exactly this value.
    pub fn to_literal(&self) -> Literal {
        match self {
            Value::Bool(b) => Literal::Bool(*b),
            Value::String(s) => Literal::Str(s.clone()),
            Value::F32(v) if v.is_nan() || *v == std::f32::INFINITY => {
                Literal::Ident(self.to_string())
            }
            Value::F64(v) if v.is_nan() || *v == std::f64::INFINITY => {
                Literal::Ident(self.to_string())
            }
            Value::Struct(fields) | Value::StructPtr(Some(fields)) => {
                Literal::Record(fields.iter().map(Value::to_literal).collect())
            }
            Value::StructPtr(None) => Literal::Null,
            _ => Literal::Number(self.to_string()),
        }
    }

    /// Does this value have the shape of `type_`? Struct fields are checked recursively.
    pub fn is_a(&self, type_: &TypeTag, spec: &InterfaceSpecification) -> bool {
        let fields_match = |name: &str, fields: &[Value]| {
            spec.struct_(name).map_or(false, |s| {
                s.fields.len() == fields.len()
                    && s.fields
                        .iter()
                        .zip(fields.iter())
                        .all(|(f, v)| v.is_a(&f.type_, spec))
            })
        };
        match (self, type_) {
            (Value::Bool(_), TypeTag::Scalar(ScalarType::Bool))
            | (Value::I8(_), TypeTag::Scalar(ScalarType::Int8))
            | (Value::I16(_), TypeTag::Scalar(ScalarType::Int16))
            | (Value::I32(_), TypeTag::Scalar(ScalarType::Int32))
            | (Value::I64(_), TypeTag::Scalar(ScalarType::Int64))
            | (Value::U8(_), TypeTag::Scalar(ScalarType::Uint8))
            | (Value::U16(_), TypeTag::Scalar(ScalarType::Uint16))
            | (Value::U32(_), TypeTag::Scalar(ScalarType::Uint32))
            | (Value::U64(_), TypeTag::Scalar(ScalarType::Uint64))
            | (Value::F32(_), TypeTag::Scalar(ScalarType::Float))
            | (Value::F64(_), TypeTag::Scalar(ScalarType::Double))
            | (Value::String(_), TypeTag::Scalar(ScalarType::String))
            | (Value::Enum(_), TypeTag::Enum(_))
            | (Value::StructPtr(None), TypeTag::StructPtr(_)) => true,
            (Value::Struct(fields), TypeTag::Struct(name))
            | (Value::StructPtr(Some(fields)), TypeTag::StructPtr(name)) => {
                fields_match(name, fields)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F32(v) => write_float(f, f64::from(*v), format!("{:?}", v)),
            Value::F64(v) => write_float(f, *v, format!("{:?}", v)),
            Value::String(s) => write_quoted(f, s),
            Value::Enum(v) => write!(f, "{}", v),
            Value::Struct(fields) | Value::StructPtr(Some(fields)) => write_record(f, fields),
            Value::StructPtr(None) => write!(f, "null"),
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, v: f64, repr: String) -> fmt::Result {
    if v.is_nan() {
        write!(f, "nan")
    } else if v.is_infinite() {
        write!(f, "{}", if v < 0.0 { "-inf" } else { "inf" })
    } else {
        write!(f, "{}", repr)
    }
}

fn write_record<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    write!(f, "{{")?;
    for (ix, item) in items.iter().enumerate() {
        if ix > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "}}")
}

pub(crate) fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            '\0' => write!(f, "\\0")?,
            c if c.is_control() => write!(f, "\\u{{{:x}}}", c as u32)?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

/// Undo `write_quoted`. Returns `None` on a malformed escape.
pub(crate) fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '"' => out.push('"'),
            '\'' => out.push('\''),
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'u' => {
                if chars.next()? != '{' {
                    return None;
                }
                let mut hex = String::new();
                loop {
                    match chars.next()? {
                        '}' => break,
                        h => hex.push(h),
                    }
                }
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(std::char::from_u32(code)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

fn parse_int(text: &str) -> Option<i128> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let digits = digits.replace('_', "");
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i128::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<i128>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "nan" | "NaN" => Some(f64::NAN),
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => text.replace('_', "").parse::<f64>().ok(),
    }
}

fn scalar(literal: &Literal, scalar: ScalarType) -> Result<Value, LiteralError> {
    let mismatch = || LiteralError::Mismatch {
        expected: scalar.to_string(),
        found: literal.to_string(),
    };
    macro_rules! int {
        ($text:expr, $ty:ty, $ctor:ident) => {{
            let wide = parse_int($text).ok_or_else(mismatch)?;
            <$ty>::try_from(wide)
                .map(Value::$ctor)
                .map_err(|_| LiteralError::OutOfRange {
                    text: $text.to_owned(),
                    type_: scalar,
                })
        }};
    }
    match (scalar, literal) {
        (ScalarType::Bool, Literal::Bool(b)) => Ok(Value::Bool(*b)),
        (ScalarType::String, Literal::Str(s)) => Ok(Value::String(s.clone())),
        (ScalarType::Int8, Literal::Number(t)) => int!(t, i8, I8),
        (ScalarType::Int16, Literal::Number(t)) => int!(t, i16, I16),
        (ScalarType::Int32, Literal::Number(t)) => int!(t, i32, I32),
        (ScalarType::Int64, Literal::Number(t)) => int!(t, i64, I64),
        (ScalarType::Uint8, Literal::Number(t)) => int!(t, u8, U8),
        (ScalarType::Uint16, Literal::Number(t)) => int!(t, u16, U16),
        (ScalarType::Uint32, Literal::Number(t)) => int!(t, u32, U32),
        (ScalarType::Uint64, Literal::Number(t)) => int!(t, u64, U64),
        (ScalarType::Float, Literal::Number(t)) | (ScalarType::Float, Literal::Ident(t)) => {
            let parsed = match t.as_str() {
                "nan" | "NaN" | "inf" | "-inf" => parse_float(t).map(|v| Value::F32(v as f32)),
                // parse at f32 width directly to avoid double rounding
                _ => t.replace('_', "").parse::<f32>().ok().map(Value::F32),
            };
            parsed.ok_or_else(mismatch)
        }
        (ScalarType::Double, Literal::Number(t)) | (ScalarType::Double, Literal::Ident(t)) => {
            parse_float(t).map(Value::F64).ok_or_else(mismatch)
        }
        _ => Err(mismatch()),
    }
}

fn fields(
    items: &[Literal],
    struct_name: &str,
    spec: &InterfaceSpecification,
) -> Result<Option<Vec<Value>>, LiteralError> {
    let def = spec
        .struct_(struct_name)
        .ok_or_else(|| LiteralError::UnknownType(struct_name.to_owned()))?;
    if def.fields.len() != items.len() {
        return Err(LiteralError::Arity {
            name: struct_name.to_owned(),
            expected: def.fields.len(),
            found: items.len(),
        });
    }
    let mut values = Vec::with_capacity(items.len());
    let mut complete = true;
    for (item, field) in items.iter().zip(def.fields.iter()) {
        match typed(item, &field.type_, spec)? {
            Some(v) => values.push(v),
            None => complete = false,
        }
    }
    Ok(if complete { Some(values) } else { None })
}

/// `Ok(None)` means the literal fits but leaves something to the synthesizer.
fn typed(
    literal: &Literal,
    type_: &TypeTag,
    spec: &InterfaceSpecification,
) -> Result<Option<Value>, LiteralError> {
    if let Literal::Wildcard = literal {
        return Ok(None);
    }
    match type_ {
        TypeTag::Scalar(s) => scalar(literal, *s).map(Some),
        TypeTag::Enum(name) => {
            let def = spec
                .enum_(name)
                .ok_or_else(|| LiteralError::UnknownType(name.clone()))?;
            match literal {
                Literal::Ident(variant) => def
                    .variant(variant)
                    .map(|v| Some(Value::Enum(v.value)))
                    .ok_or_else(|| LiteralError::UnknownVariant {
                        enum_: name.clone(),
                        variant: variant.clone(),
                    }),
                Literal::Number(text) => parse_int(text)
                    .and_then(|v| i32::try_from(v).ok())
                    .map(|v| Some(Value::Enum(v)))
                    .ok_or_else(|| LiteralError::OutOfRange {
                        text: text.clone(),
                        type_: ScalarType::Int32,
                    }),
                _ => Err(LiteralError::Mismatch {
                    expected: format!("enum {}", name),
                    found: literal.to_string(),
                }),
            }
        }
        TypeTag::Struct(name) => match literal {
            Literal::Record(items) => Ok(fields(items, name, spec)?.map(Value::Struct)),
            _ => Err(LiteralError::Mismatch {
                expected: format!("struct {}", name),
                found: literal.to_string(),
            }),
        },
        TypeTag::StructPtr(name) => match literal {
            Literal::Null => Ok(Some(Value::StructPtr(None))),
            Literal::Record(items) => {
                Ok(fields(items, name, spec)?.map(|fs| Value::StructPtr(Some(fs))))
            }
            _ => Err(LiteralError::Mismatch {
                expected: format!("{}* or null", name),
                found: literal.to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(s: &str) -> Literal {
        Literal::Number(s.to_owned())
    }

    #[test]
    fn integer_widths() {
        assert_eq!(scalar(&num("-128"), ScalarType::Int8), Ok(Value::I8(-128)));
        assert_eq!(scalar(&num("0xff"), ScalarType::Uint8), Ok(Value::U8(255)));
        assert_eq!(
            scalar(&num("18446744073709551615"), ScalarType::Uint64),
            Ok(Value::U64(std::u64::MAX))
        );
        assert!(matches!(
            scalar(&num("256"), ScalarType::Uint8),
            Err(LiteralError::OutOfRange { .. })
        ));
        assert!(matches!(
            scalar(&num("-1"), ScalarType::Uint32),
            Err(LiteralError::OutOfRange { .. })
        ));
        assert!(matches!(
            scalar(&Literal::Str("1".into()), ScalarType::Int32),
            Err(LiteralError::Mismatch { .. })
        ));
    }

    #[test]
    fn float_spellings() {
        assert_eq!(scalar(&num("1.5"), ScalarType::Double), Ok(Value::F64(1.5)));
        assert_eq!(scalar(&num("2"), ScalarType::Float), Ok(Value::F32(2.0)));
        assert_eq!(
            scalar(&num("-inf"), ScalarType::Float),
            Ok(Value::F32(std::f32::NEG_INFINITY))
        );
        match scalar(&Literal::Ident("nan".into()), ScalarType::Double) {
            Ok(Value::F64(v)) => assert!(v.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn quoting() {
        let raw = "a\"b\\c\nd\u{1}é";
        let quoted = Value::String(raw.to_owned()).to_string();
        assert_eq!(quoted, "\"a\\\"b\\\\c\\nd\\u{1}é\"");
        let inner = &quoted[1..quoted.len() - 1];
        assert_eq!(unescape(inner).as_deref(), Some(raw));
        assert_eq!(unescape("\\q"), None);
        assert_eq!(unescape("\\u{110000}"), None);
    }

    #[test]
    fn float_display_reparses() {
        for v in &[0.1f32, 1.0, -3.5e-12, std::f32::MAX, std::f32::MIN_POSITIVE] {
            let text = Value::F32(*v).to_string();
            assert_eq!(scalar(&num(&text), ScalarType::Float), Ok(Value::F32(*v)));
        }
    }

    #[test]
    fn overlay_fills_wildcards() {
        let top = Literal::Record(vec![Literal::Wildcard, num("2")]);
        let base = Literal::Record(vec![num("7"), num("8")]);
        assert_eq!(
            top.overlay(Some(&base)),
            Literal::Record(vec![num("7"), num("2")])
        );
        assert_eq!(Literal::Wildcard.overlay(None), Literal::Wildcard);
        assert!(!top.is_complete());
        assert!(base.is_complete());
    }
}
