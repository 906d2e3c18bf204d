// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// derived from both the LALRPOP whitespace tokenizer, and LALRPOP's
// internal tokenizer

use std::str::CharIndices;

use lazy_static::lazy_static;
use regex::Regex;
use unicode_xid::UnicodeXID;

use self::Token::*;
use crate::common::ErrorCode::*;
use crate::common::{EquationError, ErrorCode};


/// Recipe equations and unit strings share a lexer.  Equations only
/// reference variables through `${name}` placeholders; unit strings
/// are made of bare unit names.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LexerType {
    Equation,
    Units,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'input> {
    Plus,
    Minus,
    Mul,
    Div,
    Exp,
    LParen,
    RParen,
    Ident(&'input str),
    Placeholder(&'input str),
    Num(&'input str),
}

fn error<T>(code: ErrorCode, start: usize, end: usize) -> Result<T, EquationError> {
    Err(EquationError {
        start: start as u16,
        end: end as u16,
        code,
    })
}

pub type Spanned<T> = (usize, T, usize);

pub struct Lexer<'input> {
    text: &'input str,
    chars: CharIndices<'input>,
    lookahead: Option<(usize, char)>,
    is_units: bool,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str, lexer_type: LexerType) -> Self {
        let mut t = Lexer {
            text: input,
            chars: input.char_indices(),
            lookahead: None,
            is_units: matches!(lexer_type, LexerType::Units),
        };
        t.bump();
        t
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.bump_n(1)
    }

    fn bump_n(&mut self, n: usize) -> Option<(usize, char)> {
        debug_assert!(n > 0);
        self.lookahead = self.chars.nth(n - 1);
        self.lookahead
    }

    fn offset(&self) -> usize {
        match self.lookahead {
            Some((idx, _)) => idx,
            None => self.text.len(),
        }
    }

    fn word(&mut self, idx0: usize) -> Spanned<&'input str> {
        match self.take_while(is_identifier_continue) {
            Some(end) => (idx0, &self.text[idx0..end], end),
            None => (idx0, &self.text[idx0..], self.text.len()),
        }
    }

    fn take_while<F>(&mut self, mut keep_going: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        self.take_until(|c| !keep_going(c))
    }

    fn take_until<F>(&mut self, mut terminate: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        loop {
            match self.lookahead {
                None => {
                    return None;
                }
                Some((idx1, c)) => {
                    if terminate(c) {
                        return Some(idx1);
                    } else {
                        self.bump();
                    }
                }
            }
        }
    }

    fn identifierish(&mut self, idx0: usize) -> Result<Spanned<Token<'input>>, EquationError> {
        let (start, word, end) = self.word(idx0);
        if self.is_units {
            Ok((start, Ident(word), end))
        } else {
            // bare names are only meaningful in unit strings
            error(UnrecognizedToken, start, end)
        }
    }

    fn number(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        lazy_static! {
            static ref NUMBER_RE: Regex =
                Regex::new(r"^\d*(\.\d*)?([eE][-+]?(\d*(\.\d*)?)?)?").unwrap();
        }

        // we only get here on a digit or '.', so the match is never empty
        let len = NUMBER_RE
            .find(&self.text[idx0..])
            .map(|m| m.end())
            .unwrap_or(1)
            .max(1);

        self.bump_n(len);

        let end = idx0 + len;
        (idx0, Num(&self.text[idx0..end]), end)
    }

    fn placeholder(&mut self, idx0: usize) -> Result<Spanned<Token<'input>>, EquationError> {
        // eat the '$'
        self.bump();
        if !matches!(self.lookahead, Some((_, '{'))) {
            return error(UnrecognizedToken, idx0, self.offset());
        }
        // eat the '{'
        self.bump();

        match self.take_until(|c| c == '}') {
            Some(idx1) => {
                // eat the trailing '}'
                self.bump();
                let name = &self.text[idx0 + 2..idx1];
                if is_placeholder_name(name) {
                    Ok((idx0, Placeholder(name), idx1 + 1))
                } else {
                    error(BadPlaceholder, idx0, idx1 + 1)
                }
            }
            None => error(UnclosedPlaceholder, idx0, self.text.len()),
        }
    }

    #[allow(clippy::unnecessary_wraps)]
    fn consume(
        &mut self,
        i: usize,
        tok: Token<'input>,
        len: usize,
    ) -> Option<Result<Spanned<Token<'input>>, EquationError>> {
        self.bump();
        Some(Ok((i, tok, i + len)))
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Spanned<Token<'input>>, EquationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.lookahead {
                Some((i, '+')) => self.consume(i, Plus, 1),
                Some((i, '-')) => self.consume(i, Minus, 1),
                Some((i, '*')) => self.consume(i, Mul, 1),
                Some((i, '/')) => self.consume(i, Div, 1),
                Some((i, '(')) => self.consume(i, LParen, 1),
                Some((i, ')')) => self.consume(i, RParen, 1),
                Some((i, '^')) if self.is_units => self.consume(i, Exp, 1),
                Some((i, '$')) if !self.is_units => Some(self.placeholder(i)),
                Some((i, c)) if is_identifier_start(c, self.is_units) => {
                    Some(self.identifierish(i))
                }
                Some((i, c)) if is_number_start(c) => Some(Ok(self.number(i))),
                Some((_, c)) if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                Some((i, _)) => {
                    self.bump(); // eat whatever is killing us
                    Some(error(UnrecognizedToken, i, self.offset()))
                }
                None => None,
            };
        }
    }
}

/// is_placeholder_name is the one identifier shape the equation grammar
/// accepts inside `${...}`.
pub fn is_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_number_start(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

fn is_identifier_start(c: char, is_units: bool) -> bool {
    UnicodeXID::is_xid_start(c) || c == '_' || (is_units && (c == '$' || c == '%'))
}

fn is_identifier_continue(c: char) -> bool {
    UnicodeXID::is_xid_continue(c) || c == '$' || c == '%'
}
