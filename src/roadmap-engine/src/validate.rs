// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Shape checks that turn loosely typed JSON into an `UnparsedRecipe`.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::common::{Error, ErrorCode, Result};
use crate::datamodel::{UnparsedRecipe, VariableSource};
use crate::recipe_err;

fn variable_source(name: &str, source: &Value) -> Result<VariableSource> {
    let Value::Object(fields) = source else {
        return recipe_err!(
            BadVariableSource,
            format!("Variable \"{name}\" must be an object with a \"goalId\".")
        );
    };

    let goal_id = match fields.get("goalId") {
        Some(Value::String(goal_id)) => goal_id.clone(),
        _ => {
            return recipe_err!(
                MissingGoalId,
                format!("Variable \"{name}\" must have a non-empty string \"goalId\".")
            );
        }
    };

    let scale = match fields.get("scale") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => {
            return recipe_err!(
                BadScale,
                format!("Variable \"{name}\" has a \"scale\" that is not a number.")
            );
        }
    };

    Ok(VariableSource { goal_id, scale })
}

fn variables(fields: &Map<String, Value>) -> Result<Vec<(String, VariableSource)>> {
    let variables = match fields.get("variables") {
        Some(Value::Object(variables)) => variables,
        Some(_) => {
            return recipe_err!(
                VariablesNotObject,
                "Recipe \"variables\" must be an object.".to_owned()
            );
        }
        None => {
            return recipe_err!(
                MissingVariables,
                "Recipe is missing \"variables\".".to_owned()
            );
        }
    };

    variables
        .iter()
        .map(|(name, source)| variable_source(name, source).map(|source| (name.clone(), source)))
        .collect()
}

/// validate checks the shape of a recipe as it arrives from the outside
/// world and converts it into a typed `UnparsedRecipe`.
pub fn validate(input: &Value) -> Result<UnparsedRecipe> {
    let fields = match input {
        Value::Object(fields) => fields,
        Value::String(_) => {
            return recipe_err!(
                RecipeIsString,
                "Recipe must be a JSON object, not a string.".to_owned()
            );
        }
        _ => {
            return recipe_err!(NotAnObject, "Recipe must be a JSON object.".to_owned());
        }
    };

    let eq = match fields.get("eq") {
        Some(Value::String(eq)) => eq.clone(),
        Some(_) => {
            return recipe_err!(
                EquationNotString,
                "Recipe \"eq\" must be a string.".to_owned()
            );
        }
        None => {
            return recipe_err!(MissingEquation, "Recipe is missing \"eq\".".to_owned());
        }
    };
    check_equation(&eq)?;

    let recipe = UnparsedRecipe {
        eq,
        variables: variables(fields)?,
    };
    validate_recipe(&recipe)?;

    Ok(recipe)
}

fn check_equation(eq: &str) -> Result<()> {
    if eq.trim().is_empty() {
        return recipe_err!(EmptyEquation, "Recipe \"eq\" must not be empty.".to_owned());
    }
    if eq.len() > usize::from(u16::MAX) {
        return recipe_err!(
            EquationTooLong,
            format!(
                "Recipe \"eq\" is {} bytes long, the limit is {}.",
                eq.len(),
                u16::MAX
            )
        );
    }
    Ok(())
}

/// validate_recipe runs the field checks of `validate` on a recipe that
/// is already typed.
pub fn validate_recipe(recipe: &UnparsedRecipe) -> Result<()> {
    check_equation(&recipe.eq)?;

    let mut seen: HashSet<&str> = HashSet::with_capacity(recipe.variables.len());
    for (name, source) in recipe.variables.iter() {
        if name.is_empty() {
            return recipe_err!(
                EmptyVariableName,
                "Variable names must not be empty.".to_owned()
            );
        }
        if !seen.insert(name.as_str()) {
            return recipe_err!(
                DuplicateVariable,
                format!("Variable \"{name}\" is defined more than once.")
            );
        }
        if source.goal_id.trim().is_empty() {
            return recipe_err!(
                MissingGoalId,
                format!("Variable \"{name}\" must have a non-empty string \"goalId\".")
            );
        }
        if let Some(scale) = source.scale {
            if !scale.is_finite() {
                return recipe_err!(
                    BadScale,
                    format!("Variable \"{name}\" has a \"scale\" that is not a finite number.")
                );
            }
        }
    }

    Ok(())
}

/// parse_recipe reads a recipe from JSON text.
pub fn parse_recipe(text: &str) -> Result<UnparsedRecipe> {
    let value: Value = serde_json::from_str(text).map_err(|err| {
        Error::new(
            ErrorCode::InvalidJson,
            Some(format!("Recipe is not valid JSON: {err}.")),
        )
    })?;

    validate(&value)
}

/// parse_recipes reads an object of goal-id to recipe, in document
/// order.  One malformed recipe fails the whole document.
pub fn parse_recipes(text: &str) -> Result<Vec<(String, UnparsedRecipe)>> {
    let value: Value = serde_json::from_str(text).map_err(|err| {
        Error::new(
            ErrorCode::InvalidJson,
            Some(format!("Recipes are not valid JSON: {err}.")),
        )
    })?;
    let Value::Object(recipes) = value else {
        return recipe_err!(
            NotAnObject,
            "Recipes must be a JSON object of goal id to recipe.".to_owned()
        );
    };

    recipes
        .iter()
        .map(|(goal_id, recipe)| match validate(recipe) {
            Ok(recipe) => Ok((goal_id.clone(), recipe)),
            Err(err) => Err(Error::new(
                err.code,
                Some(format!("Goal \"{goal_id}\": {}", err.message())),
            )),
        })
        .collect()
}
