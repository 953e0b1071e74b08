use crate::Location;
use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Token<'a> {
    LPar,
    RPar,
    LBrace,
    RBrace,
    Star,
    Colon,
    Semi,
    Comma,
    Equals,
    /// `->`
    RArrow,
    Word(&'a str),
    /// Digits, hex, floats, and `-inf`; interpreted later at the width of the slot.
    Number(&'a str),
    /// The text between a pair of `"`, escapes left in place.
    Quote(&'a str),
}

impl<'a> Token<'a> {
    fn punctuation(c: char) -> Option<Token<'a>> {
        Some(match c {
            '(' => Token::LPar,
            ')' => Token::RPar,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '*' => Token::Star,
            ':' => Token::Colon,
            ';' => Token::Semi,
            ',' => Token::Comma,
            '=' => Token::Equals,
            _ => return None,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct LocatedToken<'a> {
    pub token: Token<'a>,
    pub location: Location,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LexError {
    InvalidChar(char),
    UnterminatedComment,
    UnterminatedQuote,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct LocatedError {
    pub error: LexError,
    pub location: Location,
}

/// Splits interface and invocation text into tokens.
///
/// Columns count characters from the start of the line, starting at 0.
pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Lexer<'a> {
        Lexer {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 0,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn offset(&mut self) -> usize {
        let end = self.source.len();
        self.chars.peek().map_or(end, |&(ix, _)| ix)
    }

    fn rest(&mut self) -> &'a str {
        let offset = self.offset();
        &self.source[offset..]
    }

    fn location(&self) -> Location {
        Location {
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn bump_while<P: Fn(char) -> bool>(&mut self, pred: P) -> &'a str {
        let begin = self.offset();
        while self.peek().map_or(false, &pred) {
            self.bump();
        }
        let end = self.offset();
        &self.source[begin..end]
    }

    fn bump_to(&mut self, offset: usize) {
        while self.offset() < offset {
            self.bump();
        }
    }

    fn skip_trivia(&mut self) -> Result<(), LocatedError> {
        loop {
            let rest = self.rest();
            if rest.starts_with("//") {
                self.bump_while(|c| c != '\n');
            } else if rest.starts_with("/*") {
                let location = self.location();
                let start = self.offset();
                match rest[2..].find("*/") {
                    Some(ix) => self.bump_to(start + 2 + ix + 2),
                    None => {
                        self.bump_to(self.source.len());
                        return Err(LocatedError {
                            error: LexError::UnterminatedComment,
                            location,
                        });
                    }
                }
            } else if self.peek().map_or(false, char::is_whitespace) {
                self.bump_while(char::is_whitespace);
            } else {
                return Ok(());
            }
        }
    }

    fn scan_number(&mut self) -> &'a str {
        let begin = self.offset();
        if self.peek() == Some('-') {
            self.bump();
        }
        loop {
            let end = self.offset();
            let so_far = &self.source[begin..end];
            match self.peek() {
                Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '.' => {}
                // exponent sign, as in `1e-7`; hex digits never take a sign
                Some('-') | Some('+')
                    if so_far.ends_with(&['e', 'E'][..])
                        && !so_far.contains(&['x', 'X'][..]) => {}
                _ => return so_far,
            }
            self.bump();
        }
    }

    fn scan_quote(&mut self) -> Result<Token<'a>, LexError> {
        self.bump();
        let begin = self.offset();
        loop {
            match self.bump() {
                None => return Err(LexError::UnterminatedQuote),
                Some('\\') => {
                    if self.bump().is_none() {
                        return Err(LexError::UnterminatedQuote);
                    }
                }
                Some('"') => break,
                Some(_) => {}
            }
        }
        let end = self.offset() - 1;
        Ok(Token::Quote(&self.source[begin..end]))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Result<LocatedToken<'a>, LocatedError>> {
        if let Err(e) = self.skip_trivia() {
            return Some(Err(e));
        }
        let location = self.location();
        let c = self.peek()?;
        let rest = self.rest();
        let signed_number = c == '-'
            && (rest[1..].starts_with("inf")
                || rest[1..].chars().next().map_or(false, |d| d.is_ascii_digit()));

        let scanned = if let Some(token) = Token::punctuation(c) {
            self.bump();
            Ok(token)
        } else if rest.starts_with("->") {
            let offset = self.offset();
            self.bump_to(offset + 2);
            Ok(Token::RArrow)
        } else if c.is_ascii_digit() || signed_number {
            Ok(Token::Number(self.scan_number()))
        } else if c == '_' || c.is_alphabetic() {
            Ok(Token::Word(self.bump_while(|c| c == '_' || c.is_alphanumeric())))
        } else if c == '"' {
            self.scan_quote()
        } else {
            self.bump();
            Err(LexError::InvalidChar(c))
        };
        Some(match scanned {
            Ok(token) => Ok(LocatedToken { token, location }),
            Err(error) => Err(LocatedError { error, location }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every token or error in `text`, with its line and column.
    fn scan(text: &str) -> Vec<Result<(Token<'_>, usize, usize), (LexError, usize, usize)>> {
        let mut lex = Lexer::new(text);
        let mut out = Vec::new();
        while let Some(next) = lex.next() {
            out.push(match next {
                Ok(t) => Ok((t.token, t.location.line, t.location.column)),
                Err(e) => Err((e.error, e.location.line, e.location.column)),
            });
        }
        out
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            scan("f // g h\n/* i\n j */ k"),
            vec![Ok((Token::Word("f"), 1, 0)), Ok((Token::Word("k"), 3, 6))]
        );
        assert_eq!(
            scan("a\n  /* closed */ b /*/"),
            vec![
                Ok((Token::Word("a"), 1, 0)),
                Ok((Token::Word("b"), 2, 15)),
                Err((LexError::UnterminatedComment, 2, 17)),
            ]
        );
    }

    #[test]
    fn quotes_keep_escapes() {
        assert_eq!(
            scan(r#"s("x\"y", "")"#),
            vec![
                Ok((Token::Word("s"), 1, 0)),
                Ok((Token::LPar, 1, 1)),
                Ok((Token::Quote(r#"x\"y"#), 1, 2)),
                Ok((Token::Comma, 1, 8)),
                Ok((Token::Quote(""), 1, 10)),
                Ok((Token::RPar, 1, 12)),
            ]
        );
        assert_eq!(
            scan("a \"b"),
            vec![
                Ok((Token::Word("a"), 1, 0)),
                Err((LexError::UnterminatedQuote, 1, 2)),
            ]
        );
    }

    #[test]
    fn numbers() {
        let numbers: Vec<_> = scan("5 -12 0xff 1.5e-7 -inf 0x1e-2")
            .into_iter()
            .map(|r| match r {
                Ok((Token::Number(n), _, _)) => n,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(numbers, vec!["5", "-12", "0xff", "1.5e-7", "-inf", "0x1e", "-2"]);

        assert_eq!(
            scan("- 1"),
            vec![
                Err((LexError::InvalidChar('-'), 1, 0)),
                Ok((Token::Number("1"), 1, 2)),
            ]
        );
    }

    #[test]
    fn declarations() {
        use self::Token::*;
        let tokens: Vec<_> = scan("struct p { x: int32 = 3, n: p* }; f()->void; $")
            .into_iter()
            .map(|r| r.map(|(t, _, _)| t).map_err(|(e, _, _)| e))
            .collect();
        assert_eq!(
            tokens,
            vec![
                Ok(Word("struct")),
                Ok(Word("p")),
                Ok(LBrace),
                Ok(Word("x")),
                Ok(Colon),
                Ok(Word("int32")),
                Ok(Equals),
                Ok(Number("3")),
                Ok(Comma),
                Ok(Word("n")),
                Ok(Colon),
                Ok(Word("p")),
                Ok(Star),
                Ok(RBrace),
                Ok(Semi),
                Ok(Word("f")),
                Ok(LPar),
                Ok(RPar),
                Ok(RArrow),
                Ok(Word("void")),
                Ok(Semi),
                Err(LexError::InvalidChar('$')),
            ]
        );
    }
}
