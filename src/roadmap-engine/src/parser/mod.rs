// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Hand-written recursive descent parser for recipe equations and unit
//! strings.
//!
//! Precedence, loosest first: `+ -`, `* /`, unary `+ -`, `^` (unit
//! strings only).  Parentheses are checked for balance over the whole
//! token stream before parsing so that a missing `)` is reported as
//! such rather than as whatever token happened to follow.

use crate::ast::{BinaryOp, Expr, Loc, UnaryOp};
use crate::common::{EquationError, EquationResult, ErrorCode};
use crate::lexer::{Lexer, LexerType, Spanned, Token};


/// TokenKind discriminant for efficient peek comparisons without payload matching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
    Plus,
    Minus,
    Mul,
    Div,
    Exp,
    LParen,
    RParen,
    Ident,
    Placeholder,
    Num,
}

impl<'a> From<&Token<'a>> for TokenKind {
    fn from(token: &Token<'a>) -> Self {
        match token {
            Token::Plus => TokenKind::Plus,
            Token::Minus => TokenKind::Minus,
            Token::Mul => TokenKind::Mul,
            Token::Div => TokenKind::Div,
            Token::Exp => TokenKind::Exp,
            Token::LParen => TokenKind::LParen,
            Token::RParen => TokenKind::RParen,
            Token::Ident(_) => TokenKind::Ident,
            Token::Placeholder(_) => TokenKind::Placeholder,
            Token::Num(_) => TokenKind::Num,
        }
    }
}

// bounds on recursion while parsing (parentheses, signs, exponents),
// and on the height of the trees handed to the evaluators
const MAX_NESTING: usize = 128;
const MAX_HEIGHT: usize = 256;
const MAX_TOKENS: usize = 4096;

/// Node is a parsed subtree along with its height.
type Node = (Expr, usize);

fn err<T>(code: ErrorCode, start: usize, end: usize) -> EquationResult<T> {
    Err(EquationError {
        start: start as u16,
        end: end as u16,
        code,
    })
}

/// Parser state holding tokenized input
struct Parser<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
    depth: usize,
}

impl<'input> Parser<'input> {
    /// Create a new parser from a lexer, collecting all tokens up front.
    /// Returns an error if the lexer produces any errors.
    fn new(lexer: Lexer<'input>) -> EquationResult<Self> {
        let tokens = lexer.collect::<EquationResult<Vec<_>>>()?;
        if tokens.len() > MAX_TOKENS {
            return err(ErrorCode::EquationTooLong, 0, 0);
        }
        Ok(Parser {
            tokens,
            pos: 0,
            depth: 0,
        })
    }

    /// check_parens verifies every `(` has a matching `)` and vice versa.
    fn check_parens(&self) -> EquationResult<()> {
        let mut open: Vec<(usize, usize)> = Vec::new();
        for (start, tok, end) in self.tokens.iter() {
            match tok {
                Token::LParen => open.push((*start, *end)),
                Token::RParen => {
                    if open.pop().is_none() {
                        return err(ErrorCode::UnmatchedParen, *start, *end);
                    }
                }
                _ => {}
            }
        }

        match open.last() {
            Some((start, end)) => err(ErrorCode::UnclosedParen, *start, *end),
            None => Ok(()),
        }
    }

    fn peek(&self) -> Option<&Spanned<Token<'input>>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|(_, tok, _)| TokenKind::from(tok))
    }

    /// Advance to the next token and return the consumed token
    fn advance(&mut self) -> Option<Spanned<Token<'input>>> {
        let tok = self.tokens.get(self.pos).copied();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// unexpected builds the error for whatever token is under the
    /// cursor, or for running off the end of the input.
    fn unexpected<T>(&self) -> EquationResult<T> {
        match self.peek() {
            Some((start, _, end)) => err(ErrorCode::UnrecognizedToken, *start, *end),
            None => {
                let pos = self.eof_position();
                let end = (pos + 1).min(usize::from(u16::MAX));
                err(ErrorCode::UnrecognizedEof, pos, end)
            }
        }
    }

    /// Expect the current token to match the expected kind, returning an error if not
    fn expect(&mut self, expected: TokenKind) -> EquationResult<Spanned<Token<'input>>> {
        if self.peek_kind() == Some(expected) {
            if let Some(tok) = self.advance() {
                return Ok(tok);
            }
        }
        self.unexpected()
    }

    fn descend(&mut self, start: usize, end: usize) -> EquationResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return err(ErrorCode::NestingTooDeep, start, end);
        }
        Ok(())
    }

    fn eof_position(&self) -> usize {
        if let Some((_, _, end)) = self.tokens.last() {
            *end
        } else {
            0
        }
    }

    /// Parse an equation from the token stream.
    /// Returns Ok(None) for empty input.
    fn parse_equation(&mut self) -> EquationResult<Option<Expr>> {
        if self.tokens.is_empty() {
            return Ok(None);
        }

        self.check_parens()?;

        let (expr, _) = self.parse_additive()?;

        if let Some((start, _, end)) = self.peek() {
            return err(ErrorCode::ExtraToken, *start, *end);
        }

        Ok(Some(expr))
    }

    fn binary(op: BinaryOp, left: Node, right: Node) -> EquationResult<Node> {
        let ((left, lheight), (right, rheight)) = (left, right);
        let loc = left.get_loc().union(&right.get_loc());
        let height = lheight.max(rheight) + 1;
        if height > MAX_HEIGHT {
            return err(ErrorCode::NestingTooDeep, loc.start.into(), loc.end.into());
        }
        Ok((Expr::Op2(op, Box::new(left), Box::new(right), loc), height))
    }

    /// Parse additive operators (+, -)
    fn parse_additive(&mut self) -> EquationResult<Node> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right)?;
        }

        Ok(left)
    }

    /// Parse multiplicative operators (*, /)
    fn parse_multiplicative(&mut self) -> EquationResult<Node> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Mul) => BinaryOp::Mul,
                Some(TokenKind::Div) => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right)?;
        }

        Ok(left)
    }

    /// Parse unary operators (+, -)
    fn parse_unary(&mut self) -> EquationResult<Node> {
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => UnaryOp::Positive,
            Some(TokenKind::Minus) => UnaryOp::Negative,
            _ => return self.parse_exponentiation(),
        };
        let (lpos, rpos) = match self.advance() {
            Some((lpos, _, rpos)) => (lpos, rpos),
            None => return self.unexpected(),
        };
        self.descend(lpos, rpos)?;
        let (operand, height) = self.parse_unary()?;
        self.depth -= 1;
        let rpos = operand.get_loc().end as usize;
        Ok((Expr::Op1(op, Box::new(operand), Loc::new(lpos, rpos)), height + 1))
    }

    /// Parse exponentiation (^), which the lexer only produces for unit
    /// strings.  The exponent may carry a sign, as in `m^-2`.
    fn parse_exponentiation(&mut self) -> EquationResult<Node> {
        let mut left = self.parse_atom()?;

        while self.peek_kind() == Some(TokenKind::Exp) {
            let Some((lpos, _, rpos)) = self.advance() else {
                break;
            };
            // `m^m^m` nests to the right
            self.descend(lpos, rpos)?;
            let right = self.parse_unary()?;
            self.depth -= 1;
            left = Self::binary(BinaryOp::Exp, left, right)?;
        }

        Ok(left)
    }

    /// Parse an atomic expression (number, placeholder, unit name,
    /// parenthesized expression)
    fn parse_atom(&mut self) -> EquationResult<Node> {
        let (lpos, tok, rpos) = match self.peek() {
            Some(tok) => *tok,
            None => return self.unexpected(),
        };

        match tok {
            Token::Num(s) => {
                self.advance();
                match s.parse::<f64>() {
                    Ok(n) if n.is_finite() => {
                        Ok((Expr::Const(s.to_string(), n, Loc::new(lpos, rpos)), 1))
                    }
                    _ => err(ErrorCode::ExpectedNumber, lpos, rpos),
                }
            }
            Token::Placeholder(id) | Token::Ident(id) => {
                self.advance();
                Ok((Expr::Var(id.to_string(), Loc::new(lpos, rpos)), 1))
            }
            Token::LParen => {
                self.advance();
                self.descend(lpos, rpos)?;
                let node = self.parse_additive()?;
                self.depth -= 1;
                self.expect(TokenKind::RParen)?;
                Ok(node)
            }
            _ => self.unexpected(),
        }
    }
}

/// Parse an equation or unit string into an AST.
///
/// Returns:
/// - `Ok(Some(expr))` for valid input
/// - `Ok(None)` for empty or whitespace-only input
/// - `Err(error)` for the first lexing or parsing error
pub fn parse(input: &str, lexer_type: LexerType) -> EquationResult<Option<Expr>> {
    if input.len() > usize::from(u16::MAX) {
        return err(ErrorCode::EquationTooLong, 0, 0);
    }

    let lexer = Lexer::new(input, lexer_type);
    let mut parser = Parser::new(lexer)?;

    parser.parse_equation()
}
