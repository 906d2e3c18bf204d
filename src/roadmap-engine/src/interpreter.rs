// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;
use std::fmt;
use std::result::Result as StdResult;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::common::{Error, ErrorCode, Result};
use crate::lexer::LexerType;
use crate::parser::parse;
use crate::recipe_err;

/// StepError is why a single evaluation produced no value.  These are
/// data problems rather than recipe problems: the year is left empty
/// and evaluation carries on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepError {
    MissingValue(String),
    DivisionByZero,
    NonFinite,
    Unbound(String),
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StepError::MissingValue(id) => write!(f, "no data for variable \"{id}\""),
            StepError::DivisionByZero => write!(f, "division by zero"),
            StepError::NonFinite => write!(f, "result is not a finite number"),
            StepError::Unbound(id) => write!(f, "variable \"{id}\" is not bound"),
        }
    }
}

pub struct Interpreter<'a> {
    bindings: &'a HashMap<String, Option<f64>>,
}

impl<'a> Interpreter<'a> {
    pub fn new(bindings: &'a HashMap<String, Option<f64>>) -> Self {
        Interpreter { bindings }
    }

    pub fn eval(&self, expr: &Expr) -> StdResult<f64, StepError> {
        let value = match expr {
            Expr::Const(_, n, _) => *n,
            Expr::Var(id, _) => match self.bindings.get(id) {
                Some(Some(value)) => *value,
                Some(None) => return Err(StepError::MissingValue(id.clone())),
                None => return Err(StepError::Unbound(id.clone())),
            },
            Expr::Op1(op, r, _) => {
                let r = self.eval(r)?;
                match op {
                    UnaryOp::Positive => r,
                    UnaryOp::Negative => -r,
                }
            }
            Expr::Op2(op, l, r, _) => {
                let l = self.eval(l)?;
                let r = self.eval(r)?;
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => {
                        if r == 0.0 {
                            return Err(StepError::DivisionByZero);
                        }
                        l / r
                    }
                    BinaryOp::Exp => l.powf(r),
                }
            }
        };

        if value.is_finite() {
            Ok(value)
        } else {
            Err(StepError::NonFinite)
        }
    }
}

/// evaluate parses `eq` and evaluates it once against `bindings`.
/// Grammar problems and placeholders without a binding are errors; a
/// null input, a division by zero or an overflow give `Ok(None)`.
pub fn evaluate(eq: &str, bindings: &HashMap<String, Option<f64>>) -> Result<Option<f64>> {
    let expr = match parse(eq, LexerType::Equation) {
        Ok(Some(expr)) => expr,
        Ok(None) => {
            return recipe_err!(EmptyEquation, "Equation must not be empty.".to_owned());
        }
        Err(err) => return Err(err.into_error(eq)),
    };

    if let Some(id) = expr.vars().into_iter().find(|id| !bindings.contains_key(*id)) {
        return Err(Error::new(
            ErrorCode::UndefinedVariable,
            Some(format!(
                "Variable \"{id}\" is used in the equation but not defined in variables."
            )),
        ));
    }

    match Interpreter::new(bindings).eval(&expr) {
        Ok(value) => Ok(Some(value)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use float_cmp::approx_eq;

    use super::{Interpreter, StepError, evaluate};
    use crate::common::{ErrorCode, ErrorKind};
    use crate::lexer::LexerType;
    use crate::parser::parse;

    fn bindings(values: &[(&str, Option<f64>)]) -> HashMap<String, Option<f64>> {
        values
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn test_arithmetic() {
        let b = bindings(&[("v0", Some(3.0)), ("v1", Some(4.0))]);
        let cases: &[(&str, f64)] = &[
            ("${v0} + ${v1} * 2", 11.0),
            ("(${v0} + ${v1}) * 2", 14.0),
            ("${v0} - ${v1} - 1", -2.0),
            ("-${v0} * -${v1}", 12.0),
            ("${v1} / ${v0} / 2", 4.0 / 3.0 / 2.0),
            ("1.5e3 + .5", 1500.5),
            ("+${v0}", 3.0),
        ];

        for (eq, expected) in cases.iter() {
            let actual = evaluate(eq, &b).unwrap().unwrap();
            assert!(approx_eq!(f64, *expected, actual), "{eq}: {actual}");
        }
    }

    #[test]
    fn test_data_problems() {
        let b = bindings(&[("v0", None), ("v1", Some(4.0)), ("v2", Some(0.0))]);
        assert_eq!(None, evaluate("${v0} + ${v1} * 2", &b).unwrap());
        assert_eq!(None, evaluate("${v1} / ${v2}", &b).unwrap());
        assert_eq!(None, evaluate("${v1} / (${v2} * 3)", &b).unwrap());
        assert_eq!(None, evaluate("1e308 * 10", &b).unwrap());
        // an unreferenced null doesn't matter
        assert_eq!(Some(4.0), evaluate("${v1}", &b).unwrap());
        assert_eq!(Some(0.0), evaluate("${v2} / ${v1}", &b).unwrap());
    }

    #[test]
    fn test_step_errors() {
        let b = bindings(&[("v0", None), ("v1", Some(10.0)), ("v2", Some(0.0))]);
        let step = |eq: &str| {
            let expr = parse(eq, LexerType::Equation).unwrap().unwrap();
            Interpreter::new(&b).eval(&expr)
        };

        assert_eq!(
            Err(StepError::MissingValue("v0".to_owned())),
            step("${v1} + ${v0}")
        );
        assert_eq!(Err(StepError::DivisionByZero), step("${v1} / ${v2}"));
        assert_eq!(Err(StepError::NonFinite), step("1e300 * 1e300"));
        assert_eq!(Err(StepError::Unbound("v9".to_owned())), step("${v9}"));
        assert_eq!("division by zero", StepError::DivisionByZero.to_string());
    }

    #[test]
    fn test_errors() {
        let b = bindings(&[("v0", Some(1.0)), ("v1", Some(2.0))]);

        let err = evaluate("${v0} @ 2", &b).unwrap_err();
        assert_eq!(ErrorKind::UnexpectedToken, err.kind);
        assert!(err.message().contains('@'));

        let err = evaluate("(${v0} + ${v1}", &b).unwrap_err();
        assert_eq!(ErrorKind::UnbalancedParens, err.kind);

        let err = evaluate("${v0} + ${v1})", &b).unwrap_err();
        assert_eq!(ErrorKind::UnbalancedParens, err.kind);

        let err = evaluate("${v0} + ${v7}", &b).unwrap_err();
        assert_eq!(ErrorKind::UndefinedVariable, err.kind);
        assert!(err.message().contains("\"v7\""));

        let err = evaluate("", &b).unwrap_err();
        assert_eq!(ErrorCode::EmptyEquation, err.code);
        assert_eq!(ErrorKind::Shape, err.kind);
    }
}
