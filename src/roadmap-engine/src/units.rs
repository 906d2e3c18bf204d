// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{HashMap, HashSet};
use std::collections::hash_map::Entry;

use float_cmp::approx_eq;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::common::{EquationError, EquationResult, Error, ErrorCode, Result};
use crate::datamodel::{Unit, UnitMap};
use crate::eqn_err;
use crate::lexer::LexerType;
use crate::parser::parse;

// exponents beyond this are certainly a typo, and would overflow
// once combined
const MAX_EXPONENT: i32 = 64;

/// ScaledUnit is a unit expressed in base units: a value of `1` in
/// this unit is `factor` in the base units of `map`.
#[derive(Debug, PartialEq, Clone)]
pub struct ScaledUnit {
    pub factor: f64,
    pub map: UnitMap,
}

impl ScaledUnit {
    fn base(name: &str) -> Self {
        ScaledUnit {
            factor: 1.0,
            map: [(name.to_owned(), 1)].into_iter().collect(),
        }
    }

    fn dimensionless(factor: f64) -> Self {
        ScaledUnit {
            factor,
            map: UnitMap::new(),
        }
    }
}

fn is_dimensionless(id: &str) -> bool {
    id == "dmnl" || id == "dimensionless"
}

/// Context resolves unit names.  It is built once from a list of unit
/// definitions and then only read, so it can be shared freely.
#[derive(Debug, Default, PartialEq)]
pub struct Context {
    aliases: HashMap<String, String>,
    units: HashMap<String, ScaledUnit>,
}

fn builtin_units() -> Vec<Unit> {
    let builtins: &[(&str, Option<&str>, &[&str])] = &[
        // emissions
        ("tCO2e", None, &[]),
        ("kgCO2e", Some("tCO2e / 1000"), &[]),
        ("ktCO2e", Some("1000 * tCO2e"), &[]),
        ("MtCO2e", Some("1000000 * tCO2e"), &[]),
        // mass
        ("kg", None, &[]),
        ("g", Some("kg / 1000"), &[]),
        ("t", Some("1000 * kg"), &[]),
        ("kt", Some("1000 * t"), &[]),
        ("Mt", Some("1000 * kt"), &[]),
        // length and area
        ("m", None, &[]),
        ("km", Some("1000 * m"), &[]),
        ("m2", Some("m^2"), &[]),
        ("km2", Some("km^2"), &[]),
        ("ha", Some("10000 * m^2"), &[]),
        // energy
        ("kWh", None, &[]),
        ("MWh", Some("1000 * kWh"), &[]),
        ("GWh", Some("1000 * MWh"), &[]),
        ("TWh", Some("1000 * GWh"), &[]),
        // population and time
        ("person", None, &["people", "persons", "capita", "inhabitants"]),
        ("year", None, &["years", "yr"]),
        ("%", Some("1 / 100"), &[]),
    ];

    builtins
        .iter()
        .map(|(name, equation, aliases)| Unit {
            name: name.to_string(),
            equation: equation.map(|eqn| eqn.to_owned()),
            disabled: false,
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
        })
        .collect()
}

/// UnitProblem remembers which definition an error came from, so the
/// message can quote the right text.
struct UnitProblem<'a> {
    name: &'a str,
    text: &'a str,
    err: EquationError,
}

impl<'a> UnitProblem<'a> {
    fn whole(name: &'a str, text: &'a str, code: ErrorCode) -> Self {
        UnitProblem {
            name,
            text,
            err: EquationError {
                start: 0,
                end: text.len().min(usize::from(u16::MAX)) as u16,
                code,
            },
        }
    }

    fn duplicate(name: &'a str) -> Self {
        Self::whole(name, name, ErrorCode::DuplicateUnit)
    }
}

/// Derived is a parsed unit equation waiting to be added to a context.
struct Derived<'a> {
    name: &'a str,
    text: &'a str,
    ast: Option<Expr>,
}

impl Context {
    /// new_with_builtins prepends the emissions, mass, area, energy,
    /// population and time units to `units`.
    pub fn new_with_builtins(units: &[Unit]) -> Result<Self> {
        let mut all_units = builtin_units();
        all_units.extend_from_slice(units);

        Self::new(&all_units)
    }

    pub fn new(units: &[Unit]) -> Result<Self> {
        let units: Vec<&Unit> = units.iter().filter(|unit| !unit.disabled).collect();
        let mut problems: Vec<UnitProblem> = Vec::new();
        let mut ctx = Context::default();

        // step 1: build our base context consisting of all prime units
        for unit in units.iter().filter(|unit| unit.equation.is_none()) {
            let unit_name = unit.name.trim();
            ctx.add_aliases(unit_name, &unit.aliases, &mut problems);
            if ctx.is_defined(unit_name) {
                problems.push(UnitProblem::duplicate(unit_name));
            } else {
                ctx.units
                    .insert(unit_name.to_owned(), ScaledUnit::base(unit_name));
            }
        }

        // step 2: parse the units with equations
        let mut pending: Vec<Derived> = Vec::new();
        for unit in units.iter() {
            let Some(eqn) = unit.equation.as_deref() else {
                continue;
            };
            let unit_name = unit.name.trim();
            ctx.add_aliases(unit_name, &unit.aliases, &mut problems);

            match parse(eqn, LexerType::Units) {
                Ok(ast) => pending.push(Derived {
                    name: unit_name,
                    text: eqn,
                    ast,
                }),
                Err(err) => problems.push(UnitProblem {
                    name: unit_name,
                    text: eqn,
                    err,
                }),
            }
        }

        // step 3: definitions may name units listed after them, so each
        // pass adds the ones whose references are all settled
        while !pending.is_empty() {
            let waiting: HashSet<&str> = pending.iter().map(|derived| derived.name).collect();
            let (ready, blocked): (Vec<Derived>, Vec<Derived>) = pending
                .into_iter()
                .partition(|derived| !ctx.waits_on(derived, &waiting));

            if ready.is_empty() {
                problems.extend(blocked.into_iter().map(|derived| {
                    UnitProblem::whole(derived.name, derived.text, ErrorCode::CircularUnit)
                }));
                break;
            }
            for derived in ready.into_iter() {
                ctx.define(derived, &mut problems);
            }
            pending = blocked;
        }

        if problems.is_empty() {
            return Ok(ctx);
        }

        let code = if problems.len() == 1 {
            problems[0].err.code
        } else {
            ErrorCode::UnitDefinitionErrors
        };
        let details = problems
            .into_iter()
            .map(|problem| {
                let message = match problem.err.code {
                    ErrorCode::DuplicateUnit => "defined more than once".to_owned(),
                    ErrorCode::CircularUnit => "circular definition".to_owned(),
                    _ => problem.err.into_error(problem.text).message(),
                };
                format!("unit \"{}\": {}", problem.name, message)
            })
            .collect::<Vec<_>>()
            .join("; ");

        Err(Error::new(code, Some(details)))
    }

    // whether `derived` names a unit that is still waiting to be defined
    fn waits_on(&self, derived: &Derived, waiting: &HashSet<&str>) -> bool {
        let Some(ref ast) = derived.ast else {
            return false;
        };
        ast.vars().into_iter().any(|id| {
            let name = self.aliases.get(id).map(String::as_str).unwrap_or(id);
            waiting.contains(name) && !self.units.contains_key(name)
        })
    }

    fn define<'a>(&mut self, derived: Derived<'a>, problems: &mut Vec<UnitProblem<'a>>) {
        let scaled = match derived.ast {
            Some(ref ast) => build_unit_components(self, ast),
            None => Ok(ScaledUnit::base(derived.name)),
        };
        match scaled {
            Err(err) => problems.push(UnitProblem {
                name: derived.name,
                text: derived.text,
                err,
            }),
            Ok(_) if self.is_defined(derived.name) => {
                problems.push(UnitProblem::duplicate(derived.name));
            }
            Ok(scaled) => {
                self.units.insert(derived.name.to_owned(), scaled);
            }
        }
    }

    fn is_defined(&self, name: &str) -> bool {
        self.aliases.contains_key(name) || self.units.contains_key(name)
    }

    fn add_aliases<'a>(
        &mut self,
        unit_name: &'a str,
        aliases: &'a [String],
        problems: &mut Vec<UnitProblem<'a>>,
    ) {
        for alias in aliases.iter() {
            let alias = alias.trim();
            if self.units.contains_key(alias) {
                problems.push(UnitProblem::duplicate(alias));
                continue;
            }
            if let Entry::Vacant(e) = self.aliases.entry(alias.to_owned()) {
                e.insert(unit_name.to_owned());
            } else {
                problems.push(UnitProblem::duplicate(alias));
            }
        }
    }

    pub fn lookup(&self, ident: &str) -> Option<&ScaledUnit> {
        // first, see if this identifier is an alias of a better-known unit
        let normalized = self.aliases.get(ident).map(|s| s.as_str()).unwrap_or(ident);
        self.units.get(normalized)
    }

    /// parse_units resolves a unit string, such as a data series' unit,
    /// into base units.  A missing or blank string means the values
    /// have no unit.
    pub fn parse_units(&self, unit_eqn: Option<&str>) -> Result<Option<ScaledUnit>> {
        let Some(unit_eqn) = unit_eqn else {
            return Ok(None);
        };

        let bad_unit = |err: EquationError| {
            let inner = err.into_error(unit_eqn);
            Error::new(
                ErrorCode::BadUnit,
                Some(format!("unit \"{unit_eqn}\": {}", inner.message())),
            )
        };

        match parse(unit_eqn, LexerType::Units).map_err(bad_unit)? {
            Some(expr) => {
                let scaled = build_unit_components(self, &expr).map_err(bad_unit)?;
                Ok(Some(scaled))
            }
            None => Ok(None),
        }
    }
}

fn const_int_eval(ast: &Expr) -> EquationResult<i32> {
    let loc = ast.get_loc();
    let result = match ast {
        Expr::Const(_, n, _) => {
            if approx_eq!(f64, *n, n.round()) && n.abs() <= f64::from(MAX_EXPONENT) {
                Some(n.round() as i32)
            } else {
                None
            }
        }
        Expr::Var(_, _) => None,
        Expr::Op1(op, expr, _) => {
            let expr = const_int_eval(expr)?;
            match op {
                UnaryOp::Positive => Some(expr),
                UnaryOp::Negative => expr.checked_neg(),
            }
        }
        Expr::Op2(op, l, r, _) => {
            let l = const_int_eval(l)?;
            let r = const_int_eval(r)?;
            match op {
                BinaryOp::Add => l.checked_add(r),
                BinaryOp::Sub => l.checked_sub(r),
                BinaryOp::Mul => l.checked_mul(r),
                BinaryOp::Div => l.checked_div(r),
                BinaryOp::Exp => u32::try_from(r).ok().and_then(|r| l.checked_pow(r)),
            }
        }
    };

    match result {
        Some(n) => Ok(n),
        None => eqn_err!(ExpectedInteger, loc.start, loc.end),
    }
}

fn checked_exp(map: UnitMap, exp: i32) -> Option<UnitMap> {
    map.map
        .into_iter()
        .map(|(unit, n)| {
            n.checked_mul(exp)
                .filter(|n| n.abs() <= MAX_EXPONENT)
                .map(|n| (unit, n))
        })
        .collect()
}

fn build_unit_components(ctx: &Context, ast: &Expr) -> EquationResult<ScaledUnit> {
    let scaled = match ast {
        Expr::Const(_, n, _) => ScaledUnit::dimensionless(*n),
        Expr::Var(id, _) => {
            if is_dimensionless(id) {
                ScaledUnit::dimensionless(1.0)
            } else {
                // unknown names are new base units
                ctx.lookup(id)
                    .cloned()
                    .unwrap_or_else(|| ScaledUnit::base(id))
            }
        }
        Expr::Op1(op, expr, _) => {
            let inner = build_unit_components(ctx, expr)?;
            match op {
                UnaryOp::Positive => inner,
                UnaryOp::Negative => ScaledUnit {
                    factor: -inner.factor,
                    map: inner.map,
                },
            }
        }
        Expr::Op2(op, l, r, loc) => match op {
            BinaryOp::Exp => {
                let exp = const_int_eval(r)?;
                let base = build_unit_components(ctx, l)?;
                let Some(map) = checked_exp(base.map, exp) else {
                    let loc = r.get_loc();
                    return eqn_err!(BadUnitExponent, loc.start, loc.end);
                };
                ScaledUnit {
                    factor: base.factor.powi(exp),
                    map,
                }
            }
            BinaryOp::Mul => {
                let l = build_unit_components(ctx, l)?;
                let r = build_unit_components(ctx, r)?;
                ScaledUnit {
                    factor: l.factor * r.factor,
                    map: l.map * r.map,
                }
            }
            BinaryOp::Div => {
                let l = build_unit_components(ctx, l)?;
                let r = build_unit_components(ctx, r)?;
                ScaledUnit {
                    factor: l.factor / r.factor,
                    map: l.map / r.map,
                }
            }
            BinaryOp::Add | BinaryOp::Sub => {
                return eqn_err!(BadBinaryOpInUnits, loc.start, loc.end);
            }
        },
    };

    if !scaled.factor.is_finite() || scaled.factor <= 0.0 {
        let loc = ast.get_loc();
        return eqn_err!(BadUnitFactor, loc.start, loc.end);
    }

    Ok(scaled)
}
