// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Property-based tests for variable renaming and equation parsing.

use std::collections::HashSet;

use proptest::prelude::*;

use crate::ast::print_eqn;
use crate::datamodel::{UnparsedRecipe, VariableSource};
use crate::lexer::LexerType;
use crate::normalize::{normalize, placeholders};
use crate::parser::parse;

// author-chosen names, including ones that look like canonical names
// and ones that JavaScript would enumerate first
fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9_]{0,8}".prop_map(|s| s.to_string()),
        "v[0-9]{1,2}".prop_map(|s| s.to_string()),
        (0u32..50).prop_map(|n| n.to_string()),
        "[A-Z][a-z ]{0,6}".prop_map(|s| s.to_string()),
    ]
}

fn names_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(name_strategy(), 1..8).prop_map(|names| {
        let mut seen = HashSet::new();
        names
            .into_iter()
            .filter(|name| seen.insert(name.clone()))
            .collect()
    })
}

fn op_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just(" + "), Just(" - "), Just(" * "), Just(" / ")]
}

fn recipe(names: &[String], ops: &[&str]) -> UnparsedRecipe {
    let mut eq = String::new();
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            eq.push_str(ops[i % ops.len()]);
        }
        eq.push_str(&format!("${{{name}}}"));
    }
    UnparsedRecipe {
        eq,
        variables: names
            .iter()
            .map(|name| (name.clone(), VariableSource::new(&format!("goal-{name}"))))
            .collect(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn every_variable_gets_one_canonical_name(
        names in names_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..4),
    ) {
        let recipe = recipe(&names, &ops);
        let mut warnings = vec![];
        let normalized = normalize(&recipe, &mut warnings).unwrap();

        prop_assert!(warnings.is_empty());
        prop_assert_eq!(names.len(), normalized.variables.len());
        prop_assert_eq!(names.len(), normalized.renames.len());

        for (i, (canonical, source)) in normalized.variables.iter().enumerate() {
            prop_assert_eq!(&format!("v{i}"), canonical);
            let placeholder = format!("${{{canonical}}}");
            prop_assert_eq!(1, normalized.eq.matches(&placeholder).count());

            let original = normalized.original_name(canonical);
            prop_assert_eq!(&format!("goal-{original}"), &source.goal_id);
        }

        let used = placeholders(&normalized.eq);
        prop_assert_eq!(names.len(), used.len());
    }

    #[test]
    fn normalizing_twice_changes_nothing(
        names in names_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..4),
    ) {
        let recipe = recipe(&names, &ops);
        let once = normalize(&recipe, &mut vec![]).unwrap();
        let twice = normalize(&once.as_unparsed(), &mut vec![]).unwrap();

        prop_assert_eq!(&once.eq, &twice.eq);
        prop_assert_eq!(&once.variables, &twice.variables);
    }

    #[test]
    fn normalized_equations_parse(
        names in names_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..4),
    ) {
        let recipe = recipe(&names, &ops);
        let normalized = normalize(&recipe, &mut vec![]).unwrap();
        let expr = parse(&normalized.eq, LexerType::Equation).unwrap().unwrap();

        // printing and re-parsing gives back the same tree
        let printed = print_eqn(&expr);
        let reparsed = parse(&printed, LexerType::Equation).unwrap().unwrap();
        prop_assert_eq!(expr.strip_loc(), reparsed.strip_loc());
    }

    #[test]
    fn parsing_arbitrary_text_never_panics(text in "[ -~]{0,64}") {
        let _ = parse(&text, LexerType::Equation);
        let _ = parse(&text, LexerType::Units);
    }
}
