use crate::error::ValidationError;
use crate::parser::{ArgSyntax, Decl, TypeSyntax};
use crate::types::{
    ArgumentSpec, EnumSpec, EnumVariant, FunctionSpec, Location, ScalarType, StructSpec,
    TargetHeader, TypeTag,
};
use crate::value::{Literal, Value};
use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;
use std::fmt;

/// Everything known about a target's interface.
///
/// Immutable once built. Declarations keep their textual order within each kind, so rendering
/// with `Display` and parsing the result gives back an equal specification.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct InterfaceSpecification {
    pub target: Option<TargetHeader>,
    pub functions: Vec<FunctionSpec>,
    pub structs: Vec<StructSpec>,
    pub enums: Vec<EnumSpec>,
}

/// A request to call one function: its name and, optionally, an argument list.
///
/// `args == None` means every argument is left to its declaration or the synthesizer.
#[derive(Debug, PartialEq, Clone)]
pub struct Invocation {
    pub function: String,
    pub args: Option<Vec<Literal>>,
}

impl Invocation {
    pub fn new<S: Into<String>>(function: S) -> Self {
        Invocation {
            function: function.into(),
            args: None,
        }
    }

    pub fn with_args<S: Into<String>>(function: S, args: Vec<Literal>) -> Self {
        Invocation {
            function: function.into(),
            args: Some(args),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.function)?;
        if let Some(ref args) = self.args {
            write!(f, "(")?;
            for (ix, arg) in args.iter().enumerate() {
                if ix > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum TypeKind {
    Struct,
    Enum,
}

struct Names {
    types: HashMap<String, (TypeKind, Location)>,
}

impl Names {
    fn resolve(&self, syntax: &TypeSyntax<'_>) -> Result<TypeTag, ValidationError> {
        if !syntax.pointer {
            if let Ok(scalar) = ScalarType::try_from(syntax.name) {
                return Ok(TypeTag::Scalar(scalar));
            }
        }
        match self.types.get(syntax.name) {
            Some((TypeKind::Struct, _)) if syntax.pointer => {
                Ok(TypeTag::StructPtr(syntax.name.to_owned()))
            }
            Some((TypeKind::Struct, _)) => Ok(TypeTag::Struct(syntax.name.to_owned())),
            Some((TypeKind::Enum, _)) if !syntax.pointer => {
                Ok(TypeTag::Enum(syntax.name.to_owned()))
            }
            Some(_) => Err(ValidationError::PointerToNonStruct {
                name: syntax.name.to_owned(),
                location: syntax.location,
            }),
            None if syntax.pointer && ScalarType::try_from(syntax.name).is_ok() => {
                Err(ValidationError::PointerToNonStruct {
                    name: syntax.name.to_owned(),
                    location: syntax.location,
                })
            }
            None => Err(ValidationError::NameNotFound {
                name: syntax.name.to_owned(),
                use_location: syntax.location,
            }),
        }
    }

    fn args(
        &self,
        args: &[ArgSyntax<'_>],
        literals: &mut Vec<(Literal, TypeTag, Location)>,
    ) -> Result<Vec<ArgumentSpec>, ValidationError> {
        let mut seen: HashMap<&str, Location> = HashMap::new();
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            if let Some(name) = arg.name {
                if let Some(previous_location) = seen.insert(name, arg.location) {
                    return Err(ValidationError::NameAlreadyExists {
                        name: name.to_owned(),
                        at_location: arg.location,
                        previous_location,
                    });
                }
            }
            let type_ = self.resolve(&arg.type_)?;
            if let Some(ref literal) = arg.literal {
                literals.push((literal.clone(), type_.clone(), arg.location));
            }
            out.push(ArgumentSpec {
                name: arg.name.map(str::to_owned),
                type_,
                literal: arg.literal.clone(),
            });
        }
        Ok(out)
    }
}

fn introduce(
    names: &mut HashMap<String, Location>,
    name: &str,
    location: Location,
) -> Result<(), ValidationError> {
    if let Some(previous_location) = names.insert(name.to_owned(), location) {
        return Err(ValidationError::NameAlreadyExists {
            name: name.to_owned(),
            at_location: location,
            previous_location,
        });
    }
    Ok(())
}

impl InterfaceSpecification {
    pub(crate) fn from_declarations(decls: &[Decl<'_>]) -> Result<Self, ValidationError> {
        let mut spec = InterfaceSpecification::default();
        let mut names = Names {
            types: HashMap::new(),
        };

        // Types may be used before they are declared, so collect their names first.
        for decl in decls {
            let (name, kind, location) = match decl {
                Decl::Struct { name, location, .. } => (*name, TypeKind::Struct, *location),
                Decl::Enum { name, location, .. } => (*name, TypeKind::Enum, *location),
                _ => continue,
            };
            if ScalarType::try_from(name).is_ok() {
                return Err(ValidationError::NameAlreadyExists {
                    name: name.to_owned(),
                    at_location: location,
                    previous_location: Location::default(),
                });
            }
            if let Some((_, previous_location)) =
                names.types.insert(name.to_owned(), (kind, location))
            {
                return Err(ValidationError::NameAlreadyExists {
                    name: name.to_owned(),
                    at_location: location,
                    previous_location,
                });
            }
        }

        let mut literals = Vec::new();
        let mut functions = HashMap::new();
        let mut struct_locations = HashMap::new();
        for decl in decls {
            match decl {
                Decl::Target {
                    name,
                    class,
                    type_,
                    version,
                    location,
                } => {
                    if spec.target.is_some() {
                        return Err(ValidationError::DuplicateHeader {
                            location: *location,
                        });
                    }
                    spec.target = Some(TargetHeader {
                        name: name.clone(),
                        class: *class,
                        type_: *type_,
                        version: *version,
                    });
                }
                Decl::Struct {
                    name,
                    fields,
                    location,
                } => {
                    struct_locations.insert(name.to_string(), *location);
                    spec.structs.push(StructSpec {
                        name: name.to_string(),
                        fields: names.args(fields, &mut literals)?,
                    });
                }
                Decl::Enum {
                    name,
                    variants,
                    location,
                } => {
                    if variants.is_empty() {
                        return Err(ValidationError::Empty {
                            name: name.to_string(),
                            location: *location,
                        });
                    }
                    let mut seen = HashMap::new();
                    let mut next = Some(0i32);
                    let mut out = Vec::with_capacity(variants.len());
                    for v in variants {
                        introduce(&mut seen, v.name, v.location)?;
                        let value = match v.value.or(next) {
                            Some(value) => value,
                            None => {
                                return Err(ValidationError::Literal {
                                    error: crate::LiteralError::OutOfRange {
                                        text: v.name.to_owned(),
                                        type_: ScalarType::Int32,
                                    },
                                    location: v.location,
                                })
                            }
                        };
                        next = value.checked_add(1);
                        out.push(EnumVariant {
                            name: v.name.to_owned(),
                            value,
                        });
                    }
                    spec.enums.push(EnumSpec {
                        name: name.to_string(),
                        variants: out,
                    });
                }
                Decl::Function {
                    name,
                    args,
                    ret,
                    location,
                } => {
                    introduce(&mut functions, name, *location)?;
                    let ret = match ret {
                        Some(ret) => Some(names.resolve(ret)?),
                        None => None,
                    };
                    spec.functions.push(FunctionSpec {
                        name: name.to_string(),
                        args: names.args(args, &mut literals)?,
                        ret,
                    });
                }
            }
        }

        spec.check_finite(&struct_locations)?;

        for (literal, type_, location) in literals {
            Value::check_literal(&literal, &type_, &spec)
                .map_err(|error| ValidationError::Literal { error, location })?;
        }
        Ok(spec)
    }

    /// A struct may not contain itself by value, directly or through other structs.
    fn check_finite(&self, locations: &HashMap<String, Location>) -> Result<(), ValidationError> {
        fn visit<'a>(
            spec: &'a InterfaceSpecification,
            name: &'a str,
            path: &mut Vec<&'a str>,
            done: &mut HashSet<&'a str>,
        ) -> Result<(), &'a str> {
            if done.contains(name) {
                return Ok(());
            }
            if path.contains(&name) {
                return Err(name);
            }
            path.push(name);
            if let Some(s) = spec.struct_(name) {
                for field in &s.fields {
                    if let TypeTag::Struct(ref inner) = field.type_ {
                        visit(spec, inner, path, done)?;
                    }
                }
            }
            path.pop();
            done.insert(name);
            Ok(())
        }

        let mut done = HashSet::new();
        for s in &self.structs {
            visit(self, &s.name, &mut Vec::new(), &mut done).map_err(|name| {
                ValidationError::Infinite {
                    name: name.to_owned(),
                    location: locations.get(name).cloned().unwrap_or_default(),
                }
            })?;
        }
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn struct_(&self, name: &str) -> Option<&StructSpec> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn enum_(&self, name: &str) -> Option<&EnumSpec> {
        self.enums.iter().find(|e| e.name == name)
    }

    /// Match an invocation against its declaration.
    ///
    /// Returns the declared arguments with the invocation's literals layered over the
    /// declaration's. The caller looks the function up first; an unknown name is reported as
    /// `NameNotFound`.
    pub fn bind(&self, invocation: &Invocation) -> Result<Vec<ArgumentSpec>, ValidationError> {
        let function = self.function(&invocation.function).ok_or_else(|| {
            ValidationError::NameNotFound {
                name: invocation.function.clone(),
                use_location: Location::default(),
            }
        })?;
        let given = match invocation.args {
            None => return Ok(function.args.clone()),
            Some(ref given) => given,
        };
        if given.len() != function.args.len() {
            return Err(ValidationError::Arity {
                function: function.name.clone(),
                expected: function.args.len(),
                found: given.len(),
            });
        }
        function
            .args
            .iter()
            .zip(given.iter())
            .enumerate()
            .map(|(index, (decl, lit))| {
                let literal = lit.overlay(decl.literal.as_ref());
                Value::check_literal(&literal, &decl.type_, self).map_err(|error| {
                    ValidationError::Argument {
                        function: function.name.clone(),
                        index,
                        error,
                    }
                })?;
                Ok(ArgumentSpec {
                    literal: match literal {
                        Literal::Wildcard => None,
                        literal => Some(literal),
                    },
                    ..decl.clone()
                })
            })
            .collect()
    }
}

impl fmt::Display for InterfaceSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref target) = self.target {
            writeln!(f, "{}", target)?;
        }
        for e in &self.enums {
            writeln!(f, "{}", e)?;
        }
        for s in &self.structs {
            writeln!(f, "{}", s)?;
        }
        for func in &self.functions {
            writeln!(f, "{};", func)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_interface, Error};

    fn validation_error(text: &str) -> ValidationError {
        match parse_interface(text) {
            Err(Error::ValidationError(e)) => e,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn forward_references() {
        let spec = parse_interface("f(a: s*);\nstruct s { m: mode }\nenum mode { a, b }")
            .expect("valid interface");
        assert_eq!(
            spec.functions[0].args[0].type_,
            TypeTag::StructPtr("s".to_owned())
        );
        assert_eq!(
            spec.struct_("s").map(|s| &s.fields[0].type_),
            Some(&TypeTag::Enum("mode".to_owned()))
        );
    }

    #[test]
    fn enum_values_count_up() {
        let spec = parse_interface("enum e { a, b = 10, c }").expect("valid interface");
        let values: Vec<i32> = spec.enums[0].variants.iter().map(|v| v.value).collect();
        assert_eq!(values, vec![0, 10, 11]);
    }

    #[test]
    fn rejects_bad_declarations() {
        assert!(matches!(
            validation_error("f();\nf(int32);"),
            ValidationError::NameAlreadyExists { .. }
        ));
        assert!(matches!(
            validation_error("f(widget);"),
            ValidationError::NameNotFound { .. }
        ));
        assert!(matches!(
            validation_error("f(int32*);"),
            ValidationError::PointerToNonStruct { .. }
        ));
        assert!(matches!(
            validation_error("enum e { }"),
            ValidationError::Empty { .. }
        ));
        assert!(matches!(
            validation_error("struct a { b: b }\nstruct b { a: a }"),
            ValidationError::Infinite { .. }
        ));
        assert!(matches!(
            validation_error("struct int32 { a: bool }"),
            ValidationError::NameAlreadyExists { .. }
        ));
        assert!(matches!(
            validation_error("f(int8 = 300);"),
            ValidationError::Literal { .. }
        ));
        assert!(matches!(
            validation_error(
                "target \"a\" class 1 type 1 version 1.0;\n\
                 target \"b\" class 1 type 1 version 1.0;"
            ),
            ValidationError::DuplicateHeader { .. }
        ));
    }

    #[test]
    fn self_reference_through_pointer_is_finite() {
        parse_interface("struct node { value: int32, next: node* }").expect("valid interface");
    }

    #[test]
    fn bind_layers_literals() {
        let spec = parse_interface(
            "f(int32 = 7, s: string, p: pt*);\n\
             struct pt { x: int32, y: int32 = 3 }",
        )
        .expect("valid interface");

        let bound = spec.bind(&Invocation::new("f")).expect("bare call binds");
        assert_eq!(bound[0].literal, Some(Literal::Number("7".into())));
        assert_eq!(bound[1].literal, None);

        let bound = spec
            .bind(&Invocation::with_args(
                "f",
                vec![
                    Literal::Wildcard,
                    Literal::Str("x".into()),
                    Literal::Record(vec![Literal::Number("1".into()), Literal::Wildcard]),
                ],
            ))
            .expect("directed call binds");
        assert_eq!(bound[0].literal, Some(Literal::Number("7".into())));
        assert_eq!(bound[1].literal, Some(Literal::Str("x".into())));
        assert_eq!(
            bound[2].literal,
            Some(Literal::Record(vec![
                Literal::Number("1".into()),
                Literal::Wildcard
            ]))
        );

        assert!(matches!(
            spec.bind(&Invocation::with_args("f", vec![])),
            Err(ValidationError::Arity {
                expected: 3,
                found: 0,
                ..
            })
        ));
        assert!(matches!(
            spec.bind(&Invocation::with_args(
                "f",
                vec![Literal::Bool(true), Literal::Wildcard, Literal::Null]
            )),
            Err(ValidationError::Argument { index: 0, .. })
        ));
        assert!(matches!(
            spec.bind(&Invocation::new("g")),
            Err(ValidationError::NameNotFound { .. })
        ));
    }

    #[test]
    fn renders_canonical_text() {
        let text = "target \"alpha\" class 1 type 2 version 1.0;\n\
                    enum mode { user = 0, sensor = 1 }\n\
                    struct light { color: uint32, mode: mode = sensor }\n\
                    doThing(int32,string)->int32;\n\
                    reset();\n";
        let spec = parse_interface(text).expect("valid interface");
        assert_eq!(spec.to_string(), text);
        assert_eq!(parse_interface(&spec.to_string()).expect("reparses"), spec);
    }
}
