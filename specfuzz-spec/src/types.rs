use crate::value::Literal;
use std::convert::TryFrom;
use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} column {}", self.line, self.column)
    }
}

/// Types that carry no structure of their own.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ScalarType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Double,
    String,
}

const SCALAR_TYPE_NAMES: &[(ScalarType, &str)] = &[
    (ScalarType::Bool, "bool"),
    (ScalarType::Int8, "int8"),
    (ScalarType::Int16, "int16"),
    (ScalarType::Int32, "int32"),
    (ScalarType::Int64, "int64"),
    (ScalarType::Uint8, "uint8"),
    (ScalarType::Uint16, "uint16"),
    (ScalarType::Uint32, "uint32"),
    (ScalarType::Uint64, "uint64"),
    (ScalarType::Float, "float"),
    (ScalarType::Double, "double"),
    (ScalarType::String, "string"),
];

#[cfg(test)]
#[test]
fn scalar_type_names_are_indexed_correctly() {
    for (ix, (scalar, _name)) in SCALAR_TYPE_NAMES.iter().enumerate() {
        assert_eq!(ix, *scalar as usize);
    }
}

impl ScalarType {
    pub fn all() -> impl Iterator<Item = ScalarType> {
        SCALAR_TYPE_NAMES.iter().map(|(s, _n)| *s)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ScalarType::Float | ScalarType::Double)
    }
}

impl TryFrom<&str> for ScalarType {
    type Error = ();
    fn try_from(name: &str) -> Result<ScalarType, ()> {
        SCALAR_TYPE_NAMES
            .iter()
            .find(|(_s, n)| *n == name)
            .map(|(s, _n)| *s)
            .ok_or(())
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (_s, n) = SCALAR_TYPE_NAMES[*self as usize];
        write!(f, "{}", n)
    }
}

/// The declared type of an argument, struct field, or return value.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum TypeTag {
    Scalar(ScalarType),
    Enum(String),
    Struct(String),
    /// A pointer to a struct; the pointer may be null.
    StructPtr(String),
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Scalar(s) => write!(f, "{}", s),
            TypeTag::Enum(name) | TypeTag::Struct(name) => write!(f, "{}", name),
            TypeTag::StructPtr(name) => write!(f, "{}*", name),
        }
    }
}

/// One typed slot: a function argument or a struct field.
#[derive(Debug, PartialEq, Clone)]
pub struct ArgumentSpec {
    pub name: Option<String>,
    pub type_: TypeTag,
    /// Used instead of a random value when present.
    pub literal: Option<Literal>,
}

impl ArgumentSpec {
    pub fn new(type_: TypeTag) -> Self {
        ArgumentSpec {
            name: None,
            type_,
            literal: None,
        }
    }

    pub fn named<S: Into<String>>(name: S, type_: TypeTag) -> Self {
        ArgumentSpec {
            name: Some(name.into()),
            type_,
            literal: None,
        }
    }

    pub fn with_literal(mut self, literal: Literal) -> Self {
        self.literal = Some(literal);
        self
    }
}

impl fmt::Display for ArgumentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref name) = self.name {
            write!(f, "{}: ", name)?;
        }
        write!(f, "{}", self.type_)?;
        if let Some(ref literal) = self.literal {
            write!(f, " = {}", literal)?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct FunctionSpec {
    pub name: String,
    pub args: Vec<ArgumentSpec>,
    /// `None` for functions returning nothing.
    pub ret: Option<TypeTag>,
}

impl fmt::Display for FunctionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (ix, arg) in self.args.iter().enumerate() {
            if ix > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")?;
        if let Some(ref ret) = self.ret {
            write!(f, "->{}", ret)?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct StructSpec {
    pub name: String,
    pub fields: Vec<ArgumentSpec>,
}

impl fmt::Display for StructSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "struct {} {{ ", self.name)?;
        for (ix, field) in self.fields.iter().enumerate() {
            if ix > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field)?;
        }
        write!(f, " }}")
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EnumVariant {
    pub name: String,
    pub value: i32,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EnumSpec {
    pub name: String,
    pub variants: Vec<EnumVariant>,
}

impl EnumSpec {
    pub fn variant(&self, name: &str) -> Option<&EnumVariant> {
        self.variants.iter().find(|v| v.name == name)
    }
}

impl fmt::Display for EnumSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enum {} {{ ", self.name)?;
        for (ix, v) in self.variants.iter().enumerate() {
            if ix > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} = {}", v.name, v.value)?;
        }
        write!(f, " }}")
    }
}

/// The identity a target reports for itself: its name, class, type, and version.
#[derive(Debug, PartialEq, Clone)]
pub struct TargetHeader {
    pub name: String,
    pub class: i32,
    pub type_: i32,
    pub version: f32,
}

impl fmt::Display for TargetHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target ")?;
        crate::value::write_quoted(f, &self.name)?;
        // Debug formatting keeps the fractional part: `1.0` rather than `1`
        write!(
            f,
            " class {} type {} version {:?};",
            self.class, self.type_, self.version
        )
    }
}
