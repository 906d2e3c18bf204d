// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::ast::{Expr, print_eqn};
use crate::common::{Error, ErrorCode, Result};
use crate::datamodel::{DataSeries, NormalizedRecipe, Settings, UnparsedRecipe, YearSpecs};
use crate::interpreter::{Interpreter, StepError};
use crate::lexer::LexerType;
use crate::normalize::normalize;
use crate::parser::parse;
use crate::recipe_err;
use crate::units::{Context, ScaledUnit};
use crate::units_check::{self, Units};
use crate::validate::validate;

/// RecipeOutput is the derived series, the unit its values are in (if
/// any) and one warning per problem found along the way.
#[derive(Clone, PartialEq, Debug, Default, Serialize)]
pub struct RecipeOutput {
    pub series: DataSeries,
    pub unit: Option<String>,
    pub warnings: Vec<String>,
}

/// Binding is a recipe variable resolved against its data source.
struct Binding<'a> {
    canonical: &'a str,
    series: &'a DataSeries,
    // multiplies raw values into base units
    factor: f64,
    unit: Option<(&'a str, ScaledUnit)>,
}

fn resolve<'a>(
    ctx: &Context,
    recipe: &'a NormalizedRecipe,
    sources: &'a HashMap<String, DataSeries>,
) -> Result<Vec<Binding<'a>>> {
    let mut bindings = Vec::with_capacity(recipe.variables.len());
    for (canonical, source) in recipe.variables.iter() {
        let original = recipe.original_name(canonical);
        let Some(series) = sources.get(&source.goal_id) else {
            return recipe_err!(
                MissingSource,
                format!(
                    "Variable \"{original}\" refers to goal \"{}\", which has no data series.",
                    source.goal_id
                )
            );
        };

        let unit_str = series.unit.as_deref().map(str::trim);
        let unit = ctx.parse_units(unit_str).map_err(|err| {
            Error::new(
                err.code,
                Some(format!("Variable \"{original}\": {}", err.message())),
            )
        })?;
        let unit_factor = unit.as_ref().map(|u| u.factor).unwrap_or(1.0);

        bindings.push(Binding {
            canonical,
            series,
            factor: source.scale() * unit_factor,
            unit: unit.and_then(|u| unit_str.map(|s| (s, u))),
        });
    }

    Ok(bindings)
}

/// output_unit picks the unit results are reported in: the declared
/// unit of the first variable with the same dimensions as the result,
/// or else the result's base units.
fn output_unit(result: &Units, bindings: &[Binding]) -> (Option<String>, f64) {
    let Units::Explicit(map) = result else {
        return (None, 1.0);
    };

    for binding in bindings.iter() {
        if let Some((name, ref scaled)) = binding.unit {
            if scaled.map == *map {
                return (Some(name.to_owned()), scaled.factor);
            }
        }
    }

    (Some(map.to_string()), 1.0)
}

/// CheckOutput describes a recipe that passed every check short of
/// evaluation.
#[derive(Clone, PartialEq, Debug, Default, Serialize)]
pub struct CheckOutput {
    pub eq: String,
    pub unit: Option<String>,
    pub warnings: Vec<String>,
}

fn binding_units(bindings: &[Binding]) -> HashMap<String, Units> {
    bindings
        .iter()
        .map(|binding| {
            let units = match binding.unit {
                Some((_, ref scaled)) => Units::Explicit(scaled.map.clone()),
                None => Units::Constant,
            };
            (binding.canonical.to_owned(), units)
        })
        .collect()
}

fn parse_normalized(recipe: &NormalizedRecipe) -> Result<Expr> {
    match parse(&recipe.eq, LexerType::Equation) {
        Ok(Some(expr)) => Ok(expr),
        Ok(None) => recipe_err!(EmptyEquation, "Recipe \"eq\" must not be empty.".to_owned()),
        Err(err) => Err(err.into_error(&recipe.eq)),
    }
}

fn step_warning(recipe: &NormalizedRecipe, year_key: &str, err: StepError) -> String {
    let err = match err {
        StepError::MissingValue(id) => {
            StepError::MissingValue(recipe.original_name(&id).to_owned())
        }
        err => err,
    };
    format!("{year_key}: {err}")
}

/// run evaluates `recipe` for every year in `specs`.  Recipe problems
/// (shape, references, grammar, units) are errors; per-year data
/// problems leave that year empty and add a warning.
pub fn run(
    ctx: &Context,
    specs: &YearSpecs,
    recipe: &UnparsedRecipe,
    sources: &HashMap<String, DataSeries>,
) -> Result<RecipeOutput> {
    let year_keys = specs.keys()?;

    let mut warnings = Vec::new();
    let normalized = normalize(recipe, &mut warnings)?;
    let bindings = resolve(ctx, &normalized, sources)?;
    let expr = parse_normalized(&normalized)?;

    let result_units = units_check::check(&expr, &binding_units(&bindings))?;
    let (unit, output_factor) = output_unit(&result_units, &bindings);

    debug!(
        eq = %normalized.eq,
        variables = bindings.len(),
        years = year_keys.len(),
        unit = ?unit,
        "evaluating recipe"
    );

    let mut series = DataSeries::new();
    let mut values: HashMap<String, Option<f64>> = HashMap::with_capacity(bindings.len());
    for year_key in year_keys.iter() {
        values.clear();
        for binding in bindings.iter() {
            let value = binding.series.get(year_key).map(|v| v * binding.factor);
            values.insert(binding.canonical.to_owned(), value);
        }

        let result = Interpreter::new(&values)
            .eval(&expr)
            .map(|value| value / output_factor)
            .and_then(|value| {
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(StepError::NonFinite)
                }
            });

        match result {
            Ok(value) => series.insert(year_key, Some(value)),
            Err(StepError::Unbound(id)) => {
                return Err(Error::new(
                    ErrorCode::UndefinedVariable,
                    Some(format!("Variable \"{id}\" does not exist.")),
                ));
            }
            Err(err) => {
                let warning = step_warning(&normalized, year_key, err);
                debug!(%warning, "no value");
                warnings.push(warning);
                series.insert(year_key, None);
            }
        }
    }

    Ok(RecipeOutput {
        series,
        unit,
        warnings,
    })
}

/// check runs every recipe check `run` does, without evaluating any
/// year.  The returned equation is the normalized one, as parsed.
pub fn check(
    ctx: &Context,
    recipe: &UnparsedRecipe,
    sources: &HashMap<String, DataSeries>,
) -> Result<CheckOutput> {
    let mut warnings = Vec::new();
    let normalized = normalize(recipe, &mut warnings)?;
    let bindings = resolve(ctx, &normalized, sources)?;
    let expr = parse_normalized(&normalized)?;
    let result_units = units_check::check(&expr, &binding_units(&bindings))?;
    let (unit, _) = output_unit(&result_units, &bindings);

    Ok(CheckOutput {
        eq: print_eqn(&expr),
        unit,
        warnings,
    })
}

/// Runner bundles the unit context and year keys recipes are evaluated
/// with.  It is immutable, and can be shared across threads.
#[derive(Debug)]
pub struct Runner {
    ctx: Context,
    specs: YearSpecs,
}

impl Runner {
    pub fn new(ctx: Context, specs: YearSpecs) -> Result<Self> {
        // bad year specs are reported here, not on every run
        specs.keys()?;
        Ok(Runner { ctx, specs })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let ctx = Context::new_with_builtins(&settings.units)?;
        Runner::new(ctx, settings.years.clone())
    }

    pub fn run(
        &self,
        recipe: &UnparsedRecipe,
        sources: &HashMap<String, DataSeries>,
    ) -> Result<RecipeOutput> {
        run(&self.ctx, &self.specs, recipe, sources)
    }

    pub fn check(
        &self,
        recipe: &UnparsedRecipe,
        sources: &HashMap<String, DataSeries>,
    ) -> Result<CheckOutput> {
        check(&self.ctx, recipe, sources)
    }

    /// run_value validates a loosely typed recipe before running it.
    pub fn run_value(
        &self,
        recipe: &Value,
        sources: &HashMap<String, DataSeries>,
    ) -> Result<RecipeOutput> {
        let recipe = validate(recipe)?;
        self.run(&recipe, sources)
    }
}
