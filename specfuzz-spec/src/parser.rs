use super::lexer::{LexError, Lexer, LocatedError, LocatedToken, Token};
use super::value::{unescape, Literal};
use super::Location;
use crate::interface::Invocation;
use std::error::Error;
use std::fmt;

#[derive(Debug, PartialEq, Clone)]
pub enum Decl<'a> {
    Target {
        name: String,
        class: i32,
        type_: i32,
        version: f32,
        location: Location,
    },
    Struct {
        name: &'a str,
        fields: Vec<ArgSyntax<'a>>,
        location: Location,
    },
    Enum {
        name: &'a str,
        variants: Vec<VariantSyntax<'a>>,
        location: Location,
    },
    Function {
        name: &'a str,
        args: Vec<ArgSyntax<'a>>,
        ret: Option<TypeSyntax<'a>>,
        location: Location,
    },
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TypeSyntax<'a> {
    pub name: &'a str,
    pub pointer: bool,
    pub location: Location,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ArgSyntax<'a> {
    pub name: Option<&'a str>,
    pub type_: TypeSyntax<'a>,
    pub literal: Option<Literal>,
    pub location: Location,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct VariantSyntax<'a> {
    pub name: &'a str,
    pub value: Option<i32>,
    pub location: Location,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseError {
    pub location: Location,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parse error at line {} column {}: {}",
            self.location.line, self.location.column, self.message
        )
    }
}

impl Error for ParseError {}

macro_rules! parse_err {
    ($loc:expr, $msg: expr ) => {
        Err(ParseError {
            location: $loc.clone(),
            message: $msg.to_string(),
        })
    };

    ($loc:expr, $fmt:expr, $( $arg:expr),+ ) => {
        Err(ParseError {
            location: $loc.clone(),
            message: format!( $fmt, $( $arg ),+ ),
        })
    };
}

macro_rules! err_ctx {
    ($ctx:expr, $res:expr) => {
        match $res {
            Ok(a) => Ok(a),
            Err(ParseError { location, message }) => Err(ParseError {
                location,
                message: format!("in {}:\n{}", $ctx, message),
            }),
        }
    };
}

/// Record literals may nest no deeper than this.
pub const MAX_LITERAL_DEPTH: usize = 32;

pub struct Parser<'a> {
    lex: Lexer<'a>,
    lookahead: Option<Token<'a>>,
    pub lex_error: Option<LexError>,
    location: Location,
}

impl<'a> Parser<'a> {
    pub fn new(text: &'a str) -> Parser<'_> {
        Parser {
            lex: Lexer::new(text),
            lookahead: None,
            lex_error: None,
            location: Location { line: 0, column: 0 },
        }
    }

    fn consume(&mut self) -> Token<'a> {
        self.lookahead.take().expect("no token to consume")
    }

    fn token(&mut self) -> Option<Token<'a>> {
        while self.lookahead == None && self.lex_error == None {
            match self.lex.next() {
                Some(Ok(LocatedToken { token, location })) => {
                    self.location = location;
                    self.lookahead = Some(token)
                }
                Some(Err(LocatedError { error, location })) => {
                    self.location = location;
                    self.lex_error = Some(error);
                    break;
                }
                None => break,
            }
        }
        self.lookahead
    }

    /// Report what was found where `expected` should have been.
    fn unexpected<T>(&mut self, expected: &str) -> Result<T, ParseError> {
        let found = self.token();
        match (found, self.lex_error) {
            (None, Some(e)) => parse_err!(self.location, "expected {}, {:?}", expected, e),
            (None, None) => parse_err!(self.location, "expected {}, got end of input", expected),
            (Some(t), _) => parse_err!(self.location, "expected {}, got {:?}", expected, t),
        }
    }

    fn match_token(&mut self, want: Token<'a>, err_msg: &str) -> Result<Token<'a>, ParseError> {
        if self.token() == Some(want) {
            Ok(self.consume())
        } else {
            self.unexpected(err_msg)
        }
    }

    fn match_a_word(&mut self, err_msg: &str) -> Result<&'a str, ParseError> {
        match self.token() {
            Some(Token::Word(text)) => {
                self.consume();
                Ok(text)
            }
            _ => self.unexpected(err_msg),
        }
    }

    fn match_keyword(&mut self, keyword: &'static str) -> Result<(), ParseError> {
        match self.token() {
            Some(Token::Word(w)) if w == keyword => {
                self.consume();
                Ok(())
            }
            _ => self.unexpected(keyword),
        }
    }

    fn match_number<T: std::str::FromStr>(&mut self, err_msg: &str) -> Result<T, ParseError> {
        match self.token() {
            Some(Token::Number(text)) => {
                let location = self.location;
                self.consume();
                text.parse::<T>()
                    .or_else(|_| parse_err!(location, "{}: bad number {}", err_msg, text))
            }
            _ => self.unexpected(err_msg),
        }
    }

    fn match_star(&mut self) -> bool {
        if let Some(Token::Star) = self.token() {
            self.consume();
            true
        } else {
            false
        }
    }

    fn match_type(&mut self) -> Result<TypeSyntax<'a>, ParseError> {
        self.token();
        let location = self.location;
        let name = self.match_a_word("type name")?;
        let pointer = self.match_star();
        Ok(TypeSyntax {
            name,
            pointer,
            location,
        })
    }

    pub fn match_literal(&mut self) -> Result<Literal, ParseError> {
        self.match_nested_literal(0)
    }

    fn match_nested_literal(&mut self, depth: usize) -> Result<Literal, ParseError> {
        match self.token() {
            Some(Token::Number(text)) => {
                self.consume();
                Ok(Literal::Number(text.to_owned()))
            }
            Some(Token::Quote(raw)) => {
                let location = self.location;
                self.consume();
                match unescape(raw) {
                    Some(s) => Ok(Literal::Str(s)),
                    None => parse_err!(location, "bad escape in string \"{}\"", raw),
                }
            }
            Some(Token::Word(word)) => {
                self.consume();
                Ok(match word {
                    "true" => Literal::Bool(true),
                    "false" => Literal::Bool(false),
                    "null" => Literal::Null,
                    "_" => Literal::Wildcard,
                    ident => Literal::Ident(ident.to_owned()),
                })
            }
            Some(Token::LBrace) => {
                if depth >= MAX_LITERAL_DEPTH {
                    return parse_err!(
                        self.location,
                        "record literals nested deeper than {}",
                        MAX_LITERAL_DEPTH
                    );
                }
                self.consume();
                let mut items = Vec::new();
                loop {
                    if let Some(Token::RBrace) = self.token() {
                        self.consume();
                        break;
                    }
                    items.push(err_ctx!(
                        "record literal",
                        self.match_nested_literal(depth + 1)
                    )?);
                    match self.token() {
                        Some(Token::Comma) => {
                            self.consume();
                            continue;
                        }
                        Some(Token::RBrace) => {
                            self.consume();
                            break;
                        }
                        _ => self.unexpected(", or }")?,
                    }
                }
                Ok(Literal::Record(items))
            }
            _ => self.unexpected("literal"),
        }
    }

    fn match_default(&mut self) -> Result<Option<Literal>, ParseError> {
        if let Some(Token::Equals) = self.token() {
            self.consume();
            Ok(Some(self.match_literal()?))
        } else {
            Ok(None)
        }
    }

    /// `name: type = literal`, where the name and literal are optional for function arguments.
    fn match_arg(&mut self, name_required: bool) -> Result<ArgSyntax<'a>, ParseError> {
        self.token();
        let location = self.location;
        let first = self.match_a_word(if name_required {
            "member name"
        } else {
            "argument"
        })?;
        let (name, type_) = if let Some(Token::Colon) = self.token() {
            self.consume();
            (Some(first), self.match_type()?)
        } else if name_required {
            return self.unexpected(":");
        } else {
            let pointer = self.match_star();
            (
                None,
                TypeSyntax {
                    name: first,
                    pointer,
                    location,
                },
            )
        };
        let literal = self.match_default()?;
        Ok(ArgSyntax {
            name,
            type_,
            literal,
            location,
        })
    }

    fn match_struct_body(&mut self) -> Result<Vec<ArgSyntax<'a>>, ParseError> {
        let mut fields = Vec::new();
        loop {
            match self.token() {
                Some(Token::RBrace) => {
                    self.consume();
                    break;
                }
                Some(Token::Word(_)) => {
                    fields.push(self.match_arg(true)?);
                    match self.token() {
                        Some(Token::Comma) => {
                            self.consume();
                            continue;
                        }
                        Some(Token::RBrace) => {
                            self.consume();
                            break;
                        }
                        _ => self.unexpected(", or '}'")?,
                    }
                }
                _ => self.unexpected("member name or '}'")?,
            }
        }
        Ok(fields)
    }

    fn match_enum_body(&mut self) -> Result<Vec<VariantSyntax<'a>>, ParseError> {
        let mut variants = Vec::new();
        loop {
            match self.token() {
                Some(Token::RBrace) => {
                    self.consume();
                    break;
                }
                Some(Token::Word(name)) => {
                    let location = self.location;
                    self.consume();
                    let value = if let Some(Token::Equals) = self.token() {
                        self.consume();
                        Some(self.match_number::<i32>("variant value")?)
                    } else {
                        None
                    };
                    variants.push(VariantSyntax {
                        name,
                        value,
                        location,
                    });
                    match self.token() {
                        Some(Token::Comma) => {
                            self.consume();
                            continue;
                        }
                        Some(Token::RBrace) => {
                            self.consume();
                            break;
                        }
                        _ => self.unexpected(", or }")?,
                    }
                }
                _ => self.unexpected("variant")?,
            }
        }
        Ok(variants)
    }

    fn match_func_args(&mut self) -> Result<Vec<ArgSyntax<'a>>, ParseError> {
        let mut args = Vec::new();
        loop {
            match self.token() {
                Some(Token::RPar) => {
                    self.consume();
                    break;
                }
                Some(Token::Word(_)) => {
                    args.push(self.match_arg(false)?);
                    match self.token() {
                        Some(Token::Comma) => {
                            self.consume();
                            continue;
                        }
                        Some(Token::RPar) => {
                            self.consume();
                            break;
                        }
                        _ => self.unexpected(", or )")?,
                    }
                }
                _ => self.unexpected("argument, or )")?,
            }
        }
        Ok(args)
    }

    /// A trailing `;` is optional after `}`.
    fn skip_semi(&mut self) {
        if let Some(Token::Semi) = self.token() {
            self.consume();
        }
    }

    pub fn match_decl(&mut self) -> Result<Decl<'a>, ParseError> {
        match self.token() {
            Some(Token::Word("target")) => {
                let location = self.location;
                self.consume();
                let name = match self.token() {
                    Some(Token::Quote(raw)) => {
                        self.consume();
                        match unescape(raw) {
                            Some(name) => name,
                            None => return parse_err!(self.location, "bad escape in target name"),
                        }
                    }
                    _ => self.unexpected("quoted target name")?,
                };
                self.match_keyword("class")?;
                let class = self.match_number::<i32>("target class")?;
                self.match_keyword("type")?;
                let type_ = self.match_number::<i32>("target type")?;
                self.match_keyword("version")?;
                let version = self.match_number::<f32>("target version")?;
                self.match_token(Token::Semi, ";")?;
                Ok(Decl::Target {
                    name,
                    class,
                    type_,
                    version,
                    location,
                })
            }
            Some(Token::Word("struct")) => {
                let location = self.location;
                self.consume();
                let name = self.match_a_word("struct name")?;
                self.match_token(Token::LBrace, "{")?;
                let fields = err_ctx!(name, self.match_struct_body())?;
                self.skip_semi();
                Ok(Decl::Struct {
                    name,
                    fields,
                    location,
                })
            }
            Some(Token::Word("enum")) => {
                let location = self.location;
                self.consume();
                let name = self.match_a_word("enum name")?;
                self.match_token(Token::LBrace, "{")?;
                let variants = err_ctx!(name, self.match_enum_body())?;
                self.skip_semi();
                Ok(Decl::Enum {
                    name,
                    variants,
                    location,
                })
            }
            Some(Token::Word(name)) => {
                let location = self.location;
                self.consume();
                self.match_token(Token::LPar, "(")?;
                let args = err_ctx!(name, self.match_func_args())?;
                let ret = if let Some(Token::RArrow) = self.token() {
                    self.consume();
                    let ret = self.match_type()?;
                    if ret.name == "void" && !ret.pointer {
                        None
                    } else {
                        Some(ret)
                    }
                } else {
                    None
                };
                self.match_token(Token::Semi, ";")?;
                Ok(Decl::Function {
                    name,
                    args,
                    ret,
                    location,
                })
            }
            _ => self.unexpected("declaration"),
        }
    }

    pub fn match_decls(&mut self) -> Result<Vec<Decl<'a>>, ParseError> {
        let mut decls = Vec::new();
        loop {
            match self.token() {
                Some(_) => decls.push(self.match_decl()?),
                None if self.lex_error.is_some() => self.unexpected("declaration")?,
                None => break,
            }
        }
        Ok(decls)
    }

    /// `name`, or `name(literal, ...)`, optionally followed by `;`.
    pub fn match_invocation(&mut self) -> Result<Invocation, ParseError> {
        let function = self.match_a_word("function name")?.to_owned();
        let args = if let Some(Token::LPar) = self.token() {
            self.consume();
            let mut args = Vec::new();
            loop {
                if let Some(Token::RPar) = self.token() {
                    self.consume();
                    break;
                }
                args.push(err_ctx!(function, self.match_literal())?);
                match self.token() {
                    Some(Token::Comma) => {
                        self.consume();
                        continue;
                    }
                    Some(Token::RPar) => {
                        self.consume();
                        break;
                    }
                    _ => self.unexpected(", or )")?,
                }
            }
            Some(args)
        } else {
            None
        };
        self.skip_semi();
        match self.token() {
            None if self.lex_error.is_none() => Ok(Invocation { function, args }),
            _ => self.unexpected("end of invocation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: usize, column: usize) -> Location {
        Location { line, column }
    }

    fn ty(name: &str, pointer: bool, line: usize, column: usize) -> TypeSyntax<'_> {
        TypeSyntax {
            name,
            pointer,
            location: loc(line, column),
        }
    }

    #[test]
    fn function_decls() {
        let mut parser = Parser::new("doThing(int32,string)->int32;");
        assert_eq!(
            parser.match_decls().expect("valid decls"),
            vec![Decl::Function {
                name: "doThing",
                args: vec![
                    ArgSyntax {
                        name: None,
                        type_: ty("int32", false, 1, 8),
                        literal: None,
                        location: loc(1, 8),
                    },
                    ArgSyntax {
                        name: None,
                        type_: ty("string", false, 1, 14),
                        literal: None,
                        location: loc(1, 14),
                    },
                ],
                ret: Some(ty("int32", false, 1, 23)),
                location: loc(1, 0),
            }]
        );

        let mut parser = Parser::new("reset()->void;\nset(s: state* = null);");
        let decls = parser.match_decls().expect("valid decls");
        assert_eq!(decls.len(), 2);
        match &decls[0] {
            Decl::Function { name, args, ret, .. } => {
                assert_eq!(*name, "reset");
                assert!(args.is_empty());
                assert_eq!(*ret, None);
            }
            d => panic!("unexpected {:?}", d),
        }
        match &decls[1] {
            Decl::Function { args, .. } => {
                assert_eq!(args[0].name, Some("s"));
                assert_eq!(args[0].type_.name, "state");
                assert!(args[0].type_.pointer);
                assert_eq!(args[0].literal, Some(Literal::Null));
            }
            d => panic!("unexpected {:?}", d),
        }
    }

    #[test]
    fn struct_and_enum_decls() {
        let text = "enum mode { user, sensor = 5, other }\n\
                    struct light { color: uint32 = 0xff, mode: mode };";
        let mut parser = Parser::new(text);
        let decls = parser.match_decls().expect("valid decls");
        match &decls[0] {
            Decl::Enum { name, variants, .. } => {
                assert_eq!(*name, "mode");
                let values: Vec<_> = variants.iter().map(|v| (v.name, v.value)).collect();
                assert_eq!(
                    values,
                    vec![("user", None), ("sensor", Some(5)), ("other", None)]
                );
            }
            d => panic!("unexpected {:?}", d),
        }
        match &decls[1] {
            Decl::Struct { name, fields, .. } => {
                assert_eq!(*name, "light");
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].literal, Some(Literal::Number("0xff".into())));
                assert_eq!(fields[1].type_.name, "mode");
            }
            d => panic!("unexpected {:?}", d),
        }
    }

    #[test]
    fn target_header() {
        let mut parser = Parser::new("target \"alpha\" class 1 type -2 version 1.5;");
        assert_eq!(
            parser.match_decls().expect("valid header"),
            vec![Decl::Target {
                name: "alpha".to_owned(),
                class: 1,
                type_: -2,
                version: 1.5,
                location: loc(1, 0),
            }]
        );
    }

    #[test]
    fn literals() {
        let mut parser = Parser::new("{1, \"a\\\"b\", {_, null}, true, mode_a, -inf}");
        assert_eq!(
            parser.match_literal().expect("valid literal"),
            Literal::Record(vec![
                Literal::Number("1".into()),
                Literal::Str("a\"b".into()),
                Literal::Record(vec![Literal::Wildcard, Literal::Null]),
                Literal::Bool(true),
                Literal::Ident("mode_a".into()),
                Literal::Number("-inf".into()),
            ])
        );
    }

    #[test]
    fn invocations() {
        let mut parser = Parser::new("doThing(5,\"x\")");
        assert_eq!(
            parser.match_invocation().expect("valid invocation"),
            Invocation {
                function: "doThing".to_owned(),
                args: Some(vec![Literal::Number("5".into()), Literal::Str("x".into())]),
            }
        );

        let mut parser = Parser::new("reset;");
        assert_eq!(
            parser.match_invocation().expect("valid invocation"),
            Invocation {
                function: "reset".to_owned(),
                args: None,
            }
        );

        let mut parser = Parser::new("f(1) g(2)");
        assert!(parser.match_invocation().is_err());
    }

    #[test]
    fn errors() {
        let mut parser = Parser::new("struct s { a int32 }");
        let err = parser.match_decls().unwrap_err();
        assert_eq!(err.location, loc(1, 13));

        let mut parser = Parser::new("f(int32 $);");
        let err = parser.match_decls().unwrap_err();
        assert!(err.message.contains("InvalidChar('$')"), "{}", err.message);

        let mut parser = Parser::new("f(int32)");
        let err = parser.match_decls().unwrap_err();
        assert!(err.message.contains("end of input"), "{}", err.message);
    }

    #[test]
    fn literal_nesting_is_bounded() {
        let nested = |depth: usize| format!("f({}{})", "{".repeat(depth), "}".repeat(depth));

        let text = nested(MAX_LITERAL_DEPTH);
        let mut parser = Parser::new(&text);
        assert!(parser.match_invocation().is_ok());

        let text = nested(MAX_LITERAL_DEPTH + 1);
        let mut parser = Parser::new(&text);
        let err = parser.match_invocation().unwrap_err();
        assert!(err.message.contains("nested deeper"), "{}", err.message);

        // unbalanced and far too deep: rejected without exhausting the stack
        let text = format!("f({})", "{".repeat(200_000));
        let mut parser = Parser::new(&text);
        assert!(parser.match_invocation().is_err());
    }
}
