// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! End-to-end recipe evaluation, from JSON documents to derived series.

use std::collections::HashMap;
use std::fs;

use float_cmp::approx_eq;
use serde_json::json;

use roadmap_engine::datamodel::{DataSeries, Settings, YearSpecs};
use roadmap_engine::{ErrorCode, ErrorKind, Runner, parse_recipe, parse_recipes, run_batch};

fn load(name: &str) -> String {
    let path = format!("{}/tests/testdata/{name}", env!("CARGO_MANIFEST_DIR"));
    fs::read_to_string(&path).unwrap_or_else(|err| panic!("reading {path}: {err}"))
}

fn load_sources() -> HashMap<String, DataSeries> {
    serde_json::from_str(&load("series.json")).unwrap()
}

fn load_runner() -> Runner {
    let settings = Settings::from_json(&load("settings.json")).unwrap();
    Runner::from_settings(&settings).unwrap()
}

fn runner(start: i32, stop: i32) -> Runner {
    Runner::from_settings(&Settings {
        years: YearSpecs::new(start, stop),
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn sums_two_goals_with_a_missing_year() {
    let sources: HashMap<String, DataSeries> = serde_json::from_value(json!({
        "g1": {"val2020": 10, "val2021": null},
        "g2": {"val2020": 5, "val2021": 5}
    }))
    .unwrap();
    let recipe = json!({
        "eq": "${goalA} + ${goalB}",
        "variables": {"goalA": {"goalId": "g1"}, "goalB": {"goalId": "g2"}}
    });

    let output = runner(2020, 2021).run_value(&recipe, &sources).unwrap();

    assert_eq!(
        json!({"val2020": 15.0, "val2021": null}),
        serde_json::to_value(&output.series).unwrap()
    );
    assert_eq!(1, output.warnings.len());
    assert!(output.warnings[0].starts_with("val2021"));
    assert!(output.warnings[0].contains("goalA"));
    assert_eq!(None, output.unit);
}

#[test]
fn division_by_zero_only_empties_that_year() {
    let sources: HashMap<String, DataSeries> = serde_json::from_value(json!({
        "num": {"val2020": 10, "val2021": 10, "val2022": 9},
        "den": {"val2020": 2, "val2021": 0, "val2022": 3}
    }))
    .unwrap();
    let recipe = json!({
        "eq": "${n} / ${d}",
        "variables": {"n": {"goalId": "num"}, "d": {"goalId": "den"}}
    });

    let output = runner(2020, 2022).run_value(&recipe, &sources).unwrap();

    assert_eq!(Some(5.0), output.series.get("val2020"));
    assert_eq!(None, output.series.get("val2021"));
    assert_eq!(Some(3.0), output.series.get("val2022"));
    assert_eq!(vec!["val2021: division by zero".to_owned()], output.warnings);
}

#[test]
fn fatal_recipe_errors() {
    let sources: HashMap<String, DataSeries> = serde_json::from_value(json!({
        "g1": {"val2020": 1},
        "g2": {"val2020": 2}
    }))
    .unwrap();
    let runner = runner(2020, 2020);
    let variables = json!({"v0": {"goalId": "g1"}, "v1": {"goalId": "g2"}});

    let cases: &[(&str, ErrorKind)] = &[
        ("${v0} @ 2", ErrorKind::UnexpectedToken),
        ("(${v0} + ${v1}", ErrorKind::UnbalancedParens),
        ("${v0} + ${v1})", ErrorKind::UnbalancedParens),
        ("${v0} + ${v2}", ErrorKind::UndefinedVariable),
        ("${v0 + 1", ErrorKind::UnexpectedToken),
        ("   ", ErrorKind::Shape),
    ];

    for (eq, kind) in cases.iter() {
        let recipe = json!({"eq": eq, "variables": variables});
        let err = runner.run_value(&recipe, &sources).unwrap_err();
        assert_eq!(*kind, err.kind, "{eq}: {err}");
    }

    let recipe = json!({"eq": "${v0} @ 2", "variables": variables});
    let err = runner.run_value(&recipe, &sources).unwrap_err();
    assert!(err.message().contains('@'));

    let recipe = json!({"eq": "${a} + ${b}", "variables": {"a": {"goalId": "g1"}}});
    let err = runner.run_value(&recipe, &sources).unwrap_err();
    assert_eq!(ErrorKind::UndefinedVariable, err.kind);
    assert!(err.message().contains("\"b\""));

    let value = serde_json::to_value(&err).unwrap();
    assert_eq!(json!("UndefinedVariable"), value["kind"]);
    assert!(value["message"].as_str().unwrap().contains("\"b\""));
}

#[test]
fn converts_units_from_settings() {
    let runner = load_runner();
    let sources = load_sources();
    let recipe = parse_recipe(&load("recipe.json")).unwrap();

    let output = runner.run(&recipe, &sources).unwrap();

    // km are reported in base units, per inhabitant
    assert_eq!(Some("m/person".to_owned()), output.unit);
    assert!(approx_eq!(
        f64,
        225_000.0,
        output.series.get("val2020").unwrap(),
        epsilon = 1e-6
    ));
    assert_eq!(None, output.series.get("val2022"));
    assert_eq!(
        vec![
            "Variable \"unused\" is defined but not used in the equation.".to_owned(),
            "val2022: no data for variable \"fleet size\"".to_owned(),
        ],
        output.warnings
    );
}

#[test]
fn mismatched_units_are_fatal() {
    let runner = load_runner();
    let sources = load_sources();
    let recipe = json!({
        "eq": "${fleet} + ${people}",
        "variables": {"fleet": {"goalId": "fleet"}, "people": {"goalId": "population"}}
    });

    let err = runner.run_value(&recipe, &sources).unwrap_err();
    assert_eq!(ErrorKind::UnitMismatch, err.kind);
    assert!(err.message().contains("vehicle"));
    assert!(err.message().contains("person"));
}

#[test]
fn bad_settings_are_rejected() {
    let err = Settings::from_json(r#"{"years": {"start": "soon"}}"#).unwrap_err();
    assert_eq!(ErrorCode::BadSettings, err.code);

    let settings = Settings::from_json(
        r#"{"units": [{"name": "tCO2e"}, {"name": "widget", "equation": "2 * gadget +"}]}"#,
    )
    .unwrap();
    let err = Runner::from_settings(&settings).unwrap_err();
    assert_eq!(ErrorKind::UnitDefinition, err.kind);
    assert_eq!(ErrorCode::UnitDefinitionErrors, err.code);
    assert!(err.message().contains("unit \"tCO2e\""));
    assert!(err.message().contains("unit \"widget\""));
}

#[test]
fn batch_chains_goals() {
    let runner = load_runner();
    let sources = load_sources();
    let recipes = parse_recipes(&load("recipes.json")).unwrap();

    let output = run_batch(&runner, &recipes, &sources);

    let ids: Vec<&str> = output.results.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(vec!["per_capita", "transport", "loop_a", "loop_b"], ids);

    let transport = output.get("transport").unwrap().as_ref().unwrap();
    assert_eq!(Some("tCO2e".to_owned()), transport.unit);
    assert!(approx_eq!(
        f64,
        2160.0,
        transport.series.get("val2020").unwrap(),
        epsilon = 1e-6
    ));
    assert!(approx_eq!(
        f64,
        2090.0,
        transport.series.get("val2021").unwrap(),
        epsilon = 1e-6
    ));
    assert_eq!(None, transport.series.get("val2022"));

    let per_capita = output.get("per_capita").unwrap().as_ref().unwrap();
    assert_eq!(Some("tCO2e/person".to_owned()), per_capita.unit);
    assert!(approx_eq!(
        f64,
        0.045,
        per_capita.series.get("val2020").unwrap(),
        epsilon = 1e-9
    ));
    assert_eq!(
        vec!["val2022: no data for variable \"transport\"".to_owned()],
        per_capita.warnings
    );

    let loops = [
        ("loop_a", "loop_a -> loop_b -> loop_a"),
        ("loop_b", "loop_b -> loop_a -> loop_b"),
    ];
    for (goal_id, path) in loops {
        let err = output.get(goal_id).unwrap().as_ref().unwrap_err();
        assert_eq!(ErrorKind::CircularDependency, err.kind);
        assert!(err.message().contains(path), "{}", err.message());
    }
}
