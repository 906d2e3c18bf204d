// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Renames the variables authors chose into canonical `v0`, `v1`, ...
//! so the equation grammar only ever sees one identifier shape.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::common::Result;
use crate::datamodel::{NormalizedRecipe, UnparsedRecipe};
use crate::recipe_err;
use crate::validate::validate_recipe;

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"\$\{([^}]*)\}").unwrap();
}

pub fn canonical_name(i: usize) -> String {
    format!("v{i}")
}

/// is_array_index is true for keys a JavaScript object enumerates
/// before all others: canonical decimal integers below 2^32 - 1.
fn is_array_index(key: &str) -> Option<u32> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|n| *n != u32::MAX)
}

/// enumeration_order lists variable names in the order a JavaScript
/// `Object.entries` would produce them for the source document.
fn enumeration_order(recipe: &UnparsedRecipe) -> Vec<&str> {
    let mut indexes: Vec<(u32, &str)> = Vec::new();
    let mut others: Vec<&str> = Vec::new();
    for (name, _) in recipe.variables.iter() {
        match is_array_index(name) {
            Some(n) => indexes.push((n, name.as_str())),
            None => others.push(name.as_str()),
        }
    }
    indexes.sort_by_key(|(n, _)| *n);

    indexes
        .into_iter()
        .map(|(_, name)| name)
        .chain(others)
        .collect()
}

fn rename_placeholders(eq: &str, renames: &[(String, String)]) -> Result<String> {
    let mut out = String::with_capacity(eq.len());
    let mut last = 0;
    for caps in PLACEHOLDER_RE.captures_iter(eq) {
        let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let id = id.as_str();
        let Some((_, canonical)) = renames.iter().find(|(original, _)| original == id) else {
            return recipe_err!(
                UndefinedVariable,
                format!("Variable \"{id}\" is used in the equation but not defined in variables.")
            );
        };
        out.push_str(&eq[last..whole.start()]);
        out.push_str("${");
        out.push_str(canonical);
        out.push('}');
        last = whole.end();
    }
    out.push_str(&eq[last..]);

    Ok(out)
}

/// placeholders returns the distinct names referenced by `eq`.
pub fn placeholders(eq: &str) -> HashSet<&str> {
    PLACEHOLDER_RE
        .captures_iter(eq)
        .filter_map(|caps| caps.get(1))
        .map(|id| id.as_str())
        .collect()
}

/// normalize validates `recipe` and renames its variables.  Variables
/// that the equation never mentions are kept, and noted in `warnings`.
pub fn normalize(recipe: &UnparsedRecipe, warnings: &mut Vec<String>) -> Result<NormalizedRecipe> {
    validate_recipe(recipe)?;

    let renames: Vec<(String, String)> = enumeration_order(recipe)
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name.to_owned(), canonical_name(i)))
        .collect();

    let eq = rename_placeholders(&recipe.eq, &renames)?;

    let mut variables = Vec::with_capacity(renames.len());
    for (original, canonical) in renames.iter() {
        let Some(source) = recipe.get_variable(original) else {
            return recipe_err!(DoesNotExist, format!("Variable \"{original}\" does not exist."));
        };
        variables.push((canonical.clone(), source.clone()));
    }

    // the substitution is a single pass over the text, make sure it
    // really left nothing behind
    let used = placeholders(&eq);
    for id in used.iter() {
        if !variables.iter().any(|(canonical, _)| canonical == id) {
            return recipe_err!(
                UndefinedVariable,
                format!("Variable \"{id}\" is used in the equation but not defined in variables.")
            );
        }
    }

    for (original, canonical) in renames.iter() {
        if !used.contains(canonical.as_str()) {
            warnings.push(format!(
                "Variable \"{original}\" is defined but not used in the equation."
            ));
        }
    }

    Ok(NormalizedRecipe {
        eq,
        variables,
        renames,
    })
}
