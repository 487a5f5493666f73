//! The lexer.
//!
//! Streams tokens out of a single source unit with one token of lookahead:
//! [Lexer::current] is the token produced by the most recent
//! [Lexer::advance], and it is undefined until the first call.  Every token
//! carries the location of its first character.

use std::iter::Peekable;
use std::str::Chars;

use derive_more::Display;

use crate::common::{id, ErrorKind, Id, Location, Result};

/// Tokens in the program.
#[derive(Clone, Copy, PartialEq, Debug, Display)]
#[display("{kind}")]
pub struct Token {
    /// What token class this token belongs to.
    pub kind: TokenKind,
    /// Where in the input its first character sits.
    pub location: Location,
}

/// Token classes.  The `Display` output is the lexeme itself (or a
/// description for the classes that have no fixed lexeme), which is what
/// diagnostics quote.
#[derive(Clone, Copy, PartialEq, Debug, Display)]
pub enum TokenKind {
    #[display("{_0}")]
    Identifier(Id),
    #[display("{_0}")]
    Integer(i64),
    #[display("=")]
    Equals,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display(";")]
    Semicolon,
    #[display(":")]
    Colon,
    #[display(",")]
    Comma,
    #[display("(")]
    LeftParen,
    #[display(")")]
    RightParen,
    #[display("{{")]
    LeftBrace,
    #[display("}}")]
    RightBrace,
    #[display("return")]
    Return,
    #[display("end of file")]
    EndOfFile,
}

/// The one reserved word of the language.
const RETURN_KEYWORD: &str = "return";

pub struct Lexer<'src> {
    chars: Peekable<Chars<'src>>,
    file: Id,
    line: usize,
    column: usize,
    current: Option<Token>,
    reached_end: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, file_name: &str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            file: id(file_name),
            line: 0,
            column: 0,
            current: None,
            reached_end: false,
        }
    }

    /// The token produced by the most recent [Lexer::advance].
    pub fn current(&self) -> Option<&Token> {
        self.current.as_ref()
    }

    /// Has the lexer emitted the end-of-file token?
    pub fn reached_end(&self) -> bool {
        self.reached_end
    }

    fn location(&self) -> Location {
        Location::new(self.file, self.line, self.column)
    }

    /// Consume one character, keeping the line and column counters in step.
    /// The column of the character after a newline is 0.
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.bump();
        }
    }

    /// Read the next token, making it the current one.
    pub fn advance(&mut self) -> Result<()> {
        self.skip_whitespace();
        let location = self.location();

        let kind = match self.chars.peek() {
            None => {
                self.reached_end = true;
                TokenKind::EndOfFile
            }
            Some(&c) if c.is_ascii_alphabetic() || c == '_' => self.read_word(),
            Some(&c) if c.is_ascii_digit() => self.read_integer(),
            Some(&c) => {
                let kind = match c {
                    '=' => TokenKind::Equals,
                    '+' => TokenKind::Plus,
                    '-' => TokenKind::Minus,
                    '*' => TokenKind::Star,
                    '/' => TokenKind::Slash,
                    ';' => TokenKind::Semicolon,
                    ':' => TokenKind::Colon,
                    ',' => TokenKind::Comma,
                    '(' => TokenKind::LeftParen,
                    ')' => TokenKind::RightParen,
                    '{' => TokenKind::LeftBrace,
                    '}' => TokenKind::RightBrace,
                    _ => return Err(ErrorKind::UnexpectedCharacter(c).at(location)),
                };
                self.bump();
                kind
            }
        };

        self.current = Some(Token { kind, location });
        Ok(())
    }

    fn read_word(&mut self) -> TokenKind {
        let mut lexeme = String::new();
        while matches!(self.chars.peek(), Some(&c) if c.is_ascii_alphanumeric() || c == '_') {
            if let Some(c) = self.bump() {
                lexeme.push(c);
            }
        }
        if lexeme == RETURN_KEYWORD {
            TokenKind::Return
        } else {
            TokenKind::Identifier(id(&lexeme))
        }
    }

    /// Decimal integers.  Overflow wraps silently; the back end enforces
    /// the bounds of whatever type the literal ends up with.
    fn read_integer(&mut self) -> TokenKind {
        let mut value: i64 = 0;
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
            if let Some(c) = self.bump() {
                let digit = (c as u8 - b'0') as i64;
                value = value.wrapping_mul(10).wrapping_add(digit);
            }
        }
        TokenKind::Integer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source, "test.mc");
        let mut tokens = Vec::new();
        while !lexer.reached_end() {
            lexer.advance().unwrap();
            tokens.push(*lexer.current().unwrap());
        }
        tokens
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex_all(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_a_declaration() {
        assert_eq!(
            kinds("i32 a = 42;"),
            vec![
                TokenKind::Identifier(id("i32")),
                TokenKind::Identifier(id("a")),
                TokenKind::Equals,
                TokenKind::Integer(42),
                TokenKind::Semicolon,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn return_is_reserved_but_type_names_are_not() {
        assert_eq!(
            kinds("return returns u32"),
            vec![
                TokenKind::Return,
                TokenKind::Identifier(id("returns")),
                TokenKind::Identifier(id("u32")),
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn punctuators() {
        assert_eq!(
            kinds("(){},:;=+-*/"),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::Comma,
                TokenKind::Colon,
                TokenKind::Semicolon,
                TokenKind::Equals,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn locations_point_at_first_characters() {
        let tokens = lex_all("ab 12\n  x");
        let positions: Vec<(usize, usize)> = tokens
            .iter()
            .map(|t| (t.location.line, t.location.column))
            .collect();
        // `ab` at 0:0, `12` at 0:3, `x` at 1:2, end of file at 1:3.
        assert_eq!(positions, vec![(0, 0), (0, 3), (1, 2), (1, 3)]);
    }

    #[test]
    fn column_resets_after_newline() {
        let tokens = lex_all("a\nb");
        assert_eq!(tokens[1].location.line, 1);
        assert_eq!(tokens[1].location.column, 0);
    }

    #[test]
    fn unexpected_character_is_reported_with_location() {
        let mut lexer = Lexer::new("a\n#", "test.mc");
        lexer.advance().unwrap();
        let error = lexer.advance().unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnexpectedCharacter('#'));
        assert_eq!(error.location.line, 1);
        assert_eq!(error.location.column, 0);
    }

    #[test]
    fn large_literals_wrap_instead_of_failing() {
        // 2^63 wraps to a negative value at this layer; range checks
        // happen once a target type is known.
        let tokens = kinds("9223372036854775808");
        assert_eq!(tokens[0], TokenKind::Integer(i64::MIN));
    }

    #[test]
    fn printing_and_relexing_is_stable() {
        let source = "i32 main ( ) { return 1 + 2 * x ; }";
        let printed: Vec<String> = kinds(source).iter().map(|k| k.to_string()).collect();
        // Drop the trailing "end of file" marker before re-lexing.
        let roundtrip = printed[..printed.len() - 1].join(" ");
        assert_eq!(kinds(&roundtrip), kinds(source));
    }
}
