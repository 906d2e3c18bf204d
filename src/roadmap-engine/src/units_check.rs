// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use crate::ast::{BinaryOp, Expr};
use crate::common::Result;
use crate::datamodel::UnitMap;
use crate::recipe_err;

/// Units is used to distinguish between explicit units (and explicit
/// dimensionless-ness) and dimensionless-ness that comes from computing
/// on constants.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Units {
    Explicit(UnitMap),
    Constant,
}

impl Units {
    /// equals is true when values in these units may be added together.
    /// Constants are compatible with everything.
    pub fn equals(&self, rhs: &Units) -> bool {
        match (self, rhs) {
            (Units::Constant, Units::Constant)
            | (Units::Explicit(_), Units::Constant)
            | (Units::Constant, Units::Explicit(_)) => true,
            (Units::Explicit(lhs), Units::Explicit(rhs)) => *lhs == *rhs,
        }
    }
}

struct UnitEvaluator<'a> {
    units: &'a HashMap<String, Units>,
}

impl UnitEvaluator<'_> {
    fn check(&self, expr: &Expr) -> Result<Units> {
        match expr {
            Expr::Const(_, _, _) => Ok(Units::Constant),
            Expr::Var(id, _) => match self.units.get(id) {
                Some(units) => Ok(units.clone()),
                None => recipe_err!(
                    UndefinedVariable,
                    format!("Variable \"{id}\" has no known unit.")
                ),
            },
            Expr::Op1(_, r, _) => self.check(r),
            Expr::Op2(op, l, r, loc) => {
                let lunits = self.check(l)?;
                let runits = self.check(r)?;
                match op {
                    BinaryOp::Add | BinaryOp::Sub => {
                        if !lunits.equals(&runits) {
                            let verb = if *op == BinaryOp::Add {
                                "add"
                            } else {
                                "subtract"
                            };
                            return recipe_err!(
                                UnitMismatch,
                                format!(
                                    "Unit mismatch at position {}: cannot {verb} \"{}\" and \"{}\".",
                                    loc.start,
                                    describe(&lunits),
                                    describe(&runits),
                                )
                            );
                        }
                        match lunits {
                            Units::Constant => Ok(runits),
                            explicit => Ok(explicit),
                        }
                    }
                    BinaryOp::Mul => Ok(match (lunits, runits) {
                        (Units::Constant, units) | (units, Units::Constant) => units,
                        (Units::Explicit(l), Units::Explicit(r)) => Units::Explicit(l * r),
                    }),
                    BinaryOp::Div => Ok(match (lunits, runits) {
                        (units, Units::Constant) => units,
                        (Units::Constant, Units::Explicit(r)) => Units::Explicit(r.reciprocal()),
                        (Units::Explicit(l), Units::Explicit(r)) => Units::Explicit(l / r),
                    }),
                    BinaryOp::Exp => {
                        if lunits == Units::Constant && runits == Units::Constant {
                            Ok(Units::Constant)
                        } else {
                            recipe_err!(
                                UnitMismatch,
                                format!(
                                    "Unit mismatch at position {}: exponents must be unitless.",
                                    loc.start
                                )
                            )
                        }
                    }
                }
            }
        }
    }
}

fn describe(units: &Units) -> String {
    match units {
        Units::Explicit(map) => map.to_string(),
        Units::Constant => "dmnl".to_owned(),
    }
}

/// check infers the units of `expr`, given the units of every variable
/// it references, and fails on the first sum or difference of
/// incompatible units.
pub fn check(expr: &Expr, units: &HashMap<String, Units>) -> Result<Units> {
    UnitEvaluator { units }.check(expr)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{Units, check};
    use crate::common::ErrorCode;
    use crate::datamodel::UnitMap;
    use crate::lexer::LexerType;
    use crate::parser::parse;

    fn explicit(parts: &[(&str, i32)]) -> Units {
        Units::Explicit(parts.iter().map(|(n, e)| (n.to_string(), *e)).collect())
    }

    fn units_of(eqn: &str, units: &HashMap<String, Units>) -> crate::common::Result<Units> {
        let expr = parse(eqn, LexerType::Equation).unwrap().unwrap();
        check(&expr, units)
    }

    fn context() -> HashMap<String, Units> {
        [
            ("emissions", explicit(&[("tCO2e", 1)])),
            ("more_emissions", explicit(&[("tCO2e", 1)])),
            ("population", explicit(&[("person", 1)])),
            ("area", explicit(&[("m", 2)])),
            ("share", Units::Explicit(UnitMap::new())),
            ("raw", Units::Constant),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
    }

    #[test]
    fn test_inference() {
        let ctx = context();
        let cases: &[(&str, Units)] = &[
            ("${emissions} + ${more_emissions}", explicit(&[("tCO2e", 1)])),
            ("${emissions} * 2 - 1", explicit(&[("tCO2e", 1)])),
            (
                "${emissions} / ${population}",
                explicit(&[("tCO2e", 1), ("person", -1)]),
            ),
            ("1 / ${area}", explicit(&[("m", -2)])),
            ("${area} / ${area}", Units::Explicit(UnitMap::new())),
            ("${emissions} * ${share}", explicit(&[("tCO2e", 1)])),
            ("${raw} + ${population}", explicit(&[("person", 1)])),
            ("-(${raw} * 3)", Units::Constant),
            ("2 + 3", Units::Constant),
        ];

        for (eqn, expected) in cases.iter() {
            assert_eq!(*expected, units_of(eqn, &ctx).unwrap(), "{eqn}");
        }
    }

    #[test]
    fn test_mismatch() {
        let ctx = context();
        let err = units_of("${emissions} + ${population}", &ctx).unwrap_err();
        assert_eq!(ErrorCode::UnitMismatch, err.code);
        assert!(err.message().contains("\"tCO2e\""));
        assert!(err.message().contains("\"person\""));

        let err = units_of("${area} - ${emissions} / ${population}", &ctx).unwrap_err();
        assert_eq!(ErrorCode::UnitMismatch, err.code);
        assert!(err.message().contains("subtract"));
        assert!(err.message().contains("\"tCO2e/person\""));

        // an explicitly dimensionless source is not a constant
        let err = units_of("${share} + ${area}", &ctx).unwrap_err();
        assert_eq!(ErrorCode::UnitMismatch, err.code);
        assert!(err.message().contains("\"dmnl\""));

        let err = units_of("${missing} * 2", &ctx).unwrap_err();
        assert_eq!(ErrorCode::UndefinedVariable, err.code);
    }
}
