//! The parser.
//!
//! A recursive-descent parser over the lexer's one-token lookahead.  The
//! grammar has two binary precedence levels (`+`/`-` below `*`/`/`), both
//! left-associative, and two postfix operators on primaries: the type cast
//! `expr : type` and the call `expr(...)`.
//!
//! Parsing fails fast: the first unexpected token aborts with a
//! description of what was expected in its place.

use crate::common::{CompileError, ErrorKind, Id, Location, Result};

use super::ast::*;
use super::lex::{Lexer, Token, TokenKind};

pub struct Parser<'src> {
    lexer: Lexer<'src>,
}

/// Parse a whole source unit.
pub fn parse(input: &str, file_name: &str) -> Result<Program> {
    Parser::new(input, file_name)?.parse_file()
}

impl<'src> Parser<'src> {
    pub fn new(input: &'src str, file_name: &str) -> Result<Self> {
        let mut lexer = Lexer::new(input, file_name);
        lexer.advance()?;
        Ok(Parser { lexer })
    }

    /// The ordered sequence of top-level declarations until end of file.
    pub fn parse_file(&mut self) -> Result<Program> {
        let mut decls = Vec::new();
        while self.current().kind != TokenKind::EndOfFile {
            decls.push(self.parse_declaration()?);
        }
        tracing::debug!(count = decls.len(), "parsed top-level declarations");
        Ok(Program { decls })
    }

    fn current(&self) -> &Token {
        match self.lexer.current() {
            Some(token) => token,
            None => unreachable!("the lexer is primed in Parser::new"),
        }
    }

    fn advance(&mut self) -> Result<()> {
        self.lexer.advance()
    }

    fn error_expected(&self, expected: &str) -> CompileError {
        let token = self.current();
        ErrorKind::UnexpectedToken {
            found: token.to_string(),
            expected: expected.to_string(),
        }
        .at(token.location)
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Location> {
        let token = self.current();
        if token.kind == kind {
            let location = token.location;
            self.advance()?;
            Ok(location)
        } else {
            Err(self.error_expected(expected))
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<(Id, Location)> {
        let token = self.current();
        if let TokenKind::Identifier(name) = token.kind {
            let location = token.location;
            self.advance()?;
            Ok((name, location))
        } else {
            Err(self.error_expected(expected))
        }
    }

    /// A top-level declaration always begins with an identifier.  Whether
    /// that identifier is a type or the declared name is decided by the
    /// token after it: another identifier means the first was the type;
    /// `=` or `(` means the declaration has no explicit type.
    fn parse_declaration(&mut self) -> Result<Decl> {
        let (first, location) = self.expect_identifier("a declaration")?;

        let (ty, name) = if let TokenKind::Identifier(second) = self.current().kind {
            self.advance()?;
            (
                Some(TypeExpr {
                    name: first,
                    location,
                }),
                second,
            )
        } else {
            (None, first)
        };

        match self.current().kind {
            TokenKind::Equals => {
                self.advance()?;
                let initializer = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Decl::Variable {
                    ty,
                    name,
                    initializer,
                    location,
                })
            }
            TokenKind::LeftParen => {
                let args = self.parse_argument_list()?;
                let body = self.parse_block()?;
                Ok(Decl::Function {
                    return_ty: ty,
                    name,
                    args,
                    body,
                    location,
                })
            }
            _ => Err(self.error_expected("`=` or `(`")),
        }
    }

    fn parse_argument_list(&mut self) -> Result<Vec<ArgDecl>> {
        self.expect(TokenKind::LeftParen, "`(`")?;
        let mut args = Vec::new();
        if self.current().kind != TokenKind::RightParen {
            loop {
                let (ty_name, location) = self.expect_identifier("an argument type")?;
                let (name, _) = self.expect_identifier("an argument name")?;
                args.push(ArgDecl {
                    ty: TypeExpr {
                        name: ty_name,
                        location,
                    },
                    name,
                    location,
                });
                if self.current().kind != TokenKind::Comma {
                    break;
                }
                self.advance()?;
            }
        }
        self.expect(TokenKind::RightParen, "`)`")?;
        Ok(args)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(TokenKind::LeftBrace, "`{`")?;
        let mut body = Vec::new();
        while !matches!(
            self.current().kind,
            TokenKind::RightBrace | TokenKind::EndOfFile
        ) {
            body.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RightBrace, "`}`")?;
        Ok(body)
    }

    /// `return expr? ;`, an assignment `lhs = rhs ;`, or a bare call.
    fn parse_statement(&mut self) -> Result<Stmt> {
        let location = self.current().location;

        if self.current().kind == TokenKind::Return {
            self.advance()?;
            let value = if self.current().kind == TokenKind::Semicolon {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect(TokenKind::Semicolon, "`;`")?;
            return Ok(Stmt::Return { value, location });
        }

        let expr = self.parse_expression()?;
        if self.current().kind == TokenKind::Equals {
            self.advance()?;
            let rhs = self.parse_expression()?;
            self.expect(TokenKind::Semicolon, "`;`")?;
            return Ok(Stmt::Assign {
                lhs: expr,
                rhs,
                location,
            });
        }

        // Only a call may stand alone as a statement.
        if matches!(expr, Expr::Call { .. }) {
            self.expect(TokenKind::Semicolon, "`;`")?;
            return Ok(Stmt::Call(expr));
        }
        Err(self.error_expected("`=`"))
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let location = self.current().location;
            self.advance()?;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_primary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            let location = self.current().location;
            self.advance()?;
            let right = self.parse_primary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    /// An optionally negated atom with its postfix operators.  Negation
    /// applies to the atom together with its casts and calls: `-f(x)`
    /// negates the call's result.
    fn parse_primary(&mut self) -> Result<Expr> {
        let negation = if self.current().kind == TokenKind::Minus {
            let location = self.current().location;
            self.advance()?;
            Some(location)
        } else {
            None
        };

        let mut expr = self.parse_atom()?;
        loop {
            match self.current().kind {
                TokenKind::Colon => {
                    let location = self.current().location;
                    self.advance()?;
                    let (name, ty_location) = self.expect_identifier("a type name")?;
                    expr = Expr::TypeCast {
                        inner: Box::new(expr),
                        target: TypeExpr {
                            name,
                            location: ty_location,
                        },
                        location,
                    };
                }
                TokenKind::LeftParen => {
                    let location = self.current().location;
                    let args = self.parse_call_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        location,
                    };
                }
                _ => break,
            }
        }

        Ok(match negation {
            Some(location) => Expr::Negation {
                inner: Box::new(expr),
                location,
            },
            None => expr,
        })
    }

    fn parse_call_arguments(&mut self) -> Result<Vec<Expr>> {
        self.expect(TokenKind::LeftParen, "`(`")?;
        let mut args = Vec::new();
        if self.current().kind != TokenKind::RightParen {
            loop {
                args.push(self.parse_expression()?);
                if self.current().kind != TokenKind::Comma {
                    break;
                }
                self.advance()?;
            }
        }
        self.expect(TokenKind::RightParen, "`)`")?;
        Ok(args)
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        let token = *self.current();
        match token.kind {
            TokenKind::Identifier(name) => {
                self.advance()?;
                Ok(Expr::Identifier {
                    name,
                    location: token.location,
                })
            }
            TokenKind::Integer(value) => {
                self.advance()?;
                Ok(Expr::Integer {
                    value,
                    location: token.location,
                })
            }
            TokenKind::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RightParen, "`)`")?;
                Ok(expr)
            }
            _ => Err(self.error_expected("an expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;

    fn parse_ok(source: &str) -> Program {
        parse(source, "test.mc").unwrap()
    }

    #[test]
    fn parses_a_typed_global() {
        let program = parse_ok("i32 a = 42;");
        assert_eq!(program.decls.len(), 1);
        match &program.decls[0] {
            Decl::Variable {
                ty: Some(ty),
                name,
                initializer,
                ..
            } => {
                assert_eq!(ty.name, id("i32"));
                assert_eq!(*name, id("a"));
                assert!(matches!(initializer, Expr::Integer { value: 42, .. }));
            }
            other => panic!("expected a variable declaration, got {other:?}"),
        }
    }

    #[test]
    fn function_without_return_type_is_void() {
        let program = parse_ok("f() { return; }");
        match &program.decls[0] {
            Decl::Function {
                return_ty,
                name,
                args,
                body,
                ..
            } => {
                assert!(return_ty.is_none());
                assert_eq!(*name, id("f"));
                assert!(args.is_empty());
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected a function declaration, got {other:?}"),
        }
    }

    #[test]
    fn arguments_are_typed_pairs() {
        let program = parse_ok("i32 sum(i32 a, i32 b) { return a; }");
        match &program.decls[0] {
            Decl::Function { args, .. } => {
                assert_eq!(args.len(), 2);
                assert_eq!(args[0].ty.name, id("i32"));
                assert_eq!(args[0].name, id("a"));
                assert_eq!(args[1].name, id("b"));
            }
            other => panic!("expected a function declaration, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let program = parse_ok("i32 a = 5 + 3 * 2;");
        let Decl::Variable { initializer, .. } = &program.decls[0] else {
            panic!("expected a variable declaration");
        };
        let Expr::Binary {
            op: BinOp::Add,
            right,
            ..
        } = initializer
        else {
            panic!("expected `+` at the top, got {initializer:?}");
        };
        assert!(matches!(**right, Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn additive_operators_are_left_associative() {
        let program = parse_ok("i32 a = 1 - 2 - 3;");
        let Decl::Variable { initializer, .. } = &program.decls[0] else {
            panic!("expected a variable declaration");
        };
        // (1 - 2) - 3
        let Expr::Binary {
            op: BinOp::Sub,
            left,
            right,
            ..
        } = initializer
        else {
            panic!("expected `-` at the top");
        };
        assert!(matches!(**left, Expr::Binary { op: BinOp::Sub, .. }));
        assert!(matches!(**right, Expr::Integer { value: 3, .. }));
    }

    #[test]
    fn parentheses_override_precedence() {
        let program = parse_ok("i32 a = (5 + 3) * 2;");
        let Decl::Variable { initializer, .. } = &program.decls[0] else {
            panic!("expected a variable declaration");
        };
        assert!(matches!(
            initializer,
            Expr::Binary {
                op: BinOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn negation_wraps_the_atom_with_its_postfix_operators() {
        let program = parse_ok("f() { x = -g(); }");
        let Decl::Function { body, .. } = &program.decls[0] else {
            panic!("expected a function declaration");
        };
        let Stmt::Assign { rhs, .. } = &body[0] else {
            panic!("expected an assignment");
        };
        let Expr::Negation { inner, .. } = rhs else {
            panic!("expected a negation, got {rhs:?}");
        };
        assert!(matches!(**inner, Expr::Call { .. }));
    }

    #[test]
    fn casts_and_calls_chain_left_to_right() {
        let program = parse_ok("f() { x = y : u8 : u16; }");
        let Decl::Function { body, .. } = &program.decls[0] else {
            panic!("expected a function declaration");
        };
        let Stmt::Assign { rhs, .. } = &body[0] else {
            panic!("expected an assignment");
        };
        let Expr::TypeCast { inner, target, .. } = rhs else {
            panic!("expected a cast, got {rhs:?}");
        };
        assert_eq!(target.name, id("u16"));
        assert!(matches!(**inner, Expr::TypeCast { .. }));
    }

    #[test]
    fn assignment_lhs_is_identifier_or_cast_of_identifier() {
        let program = parse_ok("f() { a = 1; b : u8 = 2; }");
        let Decl::Function { body, .. } = &program.decls[0] else {
            panic!("expected a function declaration");
        };
        for stmt in body {
            let Stmt::Assign { lhs, .. } = stmt else {
                panic!("expected an assignment");
            };
            match lhs {
                Expr::Identifier { .. } => {}
                Expr::TypeCast { inner, .. } => {
                    assert!(matches!(**inner, Expr::Identifier { .. }))
                }
                other => panic!("unexpected assignment target {other:?}"),
            }
        }
    }

    #[test]
    fn bare_call_is_a_statement_but_bare_expression_is_not() {
        assert!(parse("f() { g(); }", "test.mc").is_ok());

        let error = parse("f() { 1 + 2; }", "test.mc").unwrap_err();
        assert!(matches!(
            error.kind,
            ErrorKind::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn missing_semicolon_reports_what_was_expected() {
        let error = parse("i32 a = 42", "test.mc").unwrap_err();
        let ErrorKind::UnexpectedToken { found, expected } = error.kind else {
            panic!("expected an unexpected-token error");
        };
        assert_eq!(found, "end of file");
        assert_eq!(expected, "`;`");
    }

    #[test]
    fn return_with_and_without_a_value() {
        let program = parse_ok("f() { return; } i32 g() { return 0; }");
        let Decl::Function { body, .. } = &program.decls[0] else {
            panic!("expected a function declaration");
        };
        assert!(matches!(body[0], Stmt::Return { value: None, .. }));
        let Decl::Function { body, .. } = &program.decls[1] else {
            panic!("expected a function declaration");
        };
        assert!(matches!(body[0], Stmt::Return { value: Some(_), .. }));
    }

    #[test]
    fn unterminated_block_fails_instead_of_looping() {
        let error = parse("f() { return;", "test.mc").unwrap_err();
        let ErrorKind::UnexpectedToken { expected, .. } = error.kind else {
            panic!("expected an unexpected-token error");
        };
        assert_eq!(expected, "`}`");
    }
}
