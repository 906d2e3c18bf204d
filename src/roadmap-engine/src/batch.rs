// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Evaluates sets of recipes whose outputs feed one another.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use rayon::prelude::*;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::common::{Error, ErrorCode, Result};
use crate::datamodel::{DataSeries, UnparsedRecipe};
use crate::recipe::{RecipeOutput, Runner};

/// BatchOutput holds one result per input recipe, in input order.
#[derive(Debug, Default)]
pub struct BatchOutput {
    pub results: Vec<(String, Result<RecipeOutput>)>,
}

impl BatchOutput {
    pub fn get(&self, goal_id: &str) -> Option<&Result<RecipeOutput>> {
        self.results
            .iter()
            .find(|(id, _)| id == goal_id)
            .map(|(_, result)| result)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Entry<'a> {
    Output(&'a RecipeOutput),
    Error(&'a Error),
}

impl Serialize for BatchOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.results.len()))?;
        for (goal_id, result) in self.results.iter() {
            let entry = match result {
                Ok(output) => Entry::Output(output),
                Err(err) => Entry::Error(err),
            };
            map.serialize_entry(goal_id, &entry)?;
        }
        map.end()
    }
}

/// Planner finds the strongly connected components of the goal graph
/// (Tarjan's algorithm, with an explicit stack) and gives every goal
/// outside a cycle a level: one more than the deepest goal it reads
/// from.
struct Planner<'a> {
    goals: &'a [&'a str],
    dependencies: &'a [Vec<usize>],
    order: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    levels: Vec<usize>,
    cycles: HashMap<usize, String>,
}

impl<'a> Planner<'a> {
    fn new(goals: &'a [&'a str], dependencies: &'a [Vec<usize>]) -> Self {
        let n = goals.len();
        Planner {
            goals,
            dependencies,
            order: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next: 0,
            levels: vec![0; n],
            cycles: HashMap::new(),
        }
    }

    fn open(&mut self, i: usize) {
        self.order[i] = Some(self.next);
        self.lowlink[i] = self.next;
        self.next += 1;
        self.stack.push(i);
        self.on_stack[i] = true;
    }

    fn visit(&mut self, root: usize) {
        if self.order[root].is_some() {
            return;
        }
        let dependencies = self.dependencies;
        self.open(root);
        // (goal, index of the next dependency to follow)
        let mut work = vec![(root, 0)];
        while let Some((i, next)) = work.pop() {
            if let Some(&dep) = dependencies[i].get(next) {
                work.push((i, next + 1));
                match self.order[dep] {
                    None => {
                        self.open(dep);
                        work.push((dep, 0));
                    }
                    Some(order) if self.on_stack[dep] => {
                        self.lowlink[i] = self.lowlink[i].min(order);
                    }
                    Some(_) => {}
                }
                continue;
            }

            if let Some(&(parent, _)) = work.last() {
                self.lowlink[parent] = self.lowlink[parent].min(self.lowlink[i]);
            }
            if self.order[i] == Some(self.lowlink[i]) {
                self.close(i);
            }
        }
    }

    // pops the component rooted at `root`.  Components come off in
    // dependency order, so every goal a member reads from outside the
    // component already has its level.
    fn close(&mut self, root: usize) {
        let Some(pos) = self.stack.iter().rposition(|&i| i == root) else {
            return;
        };
        let members = self.stack.split_off(pos);
        for &i in members.iter() {
            self.on_stack[i] = false;
        }

        if members.len() == 1 && !self.dependencies[root].contains(&root) {
            let level = self.dependencies[root]
                .iter()
                .map(|&dep| self.levels[dep] + 1)
                .max()
                .unwrap_or(0);
            self.levels[root] = level;
            return;
        }

        let component: HashSet<usize> = members.iter().copied().collect();
        for &i in members.iter() {
            let path = self.cycle_through(i, &component);
            self.cycles.insert(i, path);
        }
    }

    /// cycle_through renders the shortest dependency path from `start`
    /// back to itself, staying within `component`.
    fn cycle_through(&self, start: usize, component: &HashSet<usize>) -> String {
        let mut prev: HashMap<usize, usize> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        'search: while let Some(i) = queue.pop_front() {
            for &dep in self.dependencies[i].iter() {
                if !component.contains(&dep) || prev.contains_key(&dep) {
                    continue;
                }
                prev.insert(dep, i);
                if dep == start {
                    break 'search;
                }
                queue.push_back(dep);
            }
        }

        let mut path = vec![self.goals[start]];
        let mut cur = prev.get(&start).copied();
        while let Some(i) = cur {
            if i == start {
                break;
            }
            path.push(self.goals[i]);
            cur = prev.get(&i).copied();
        }
        path.push(self.goals[start]);
        path.reverse();
        path.join(" -> ")
    }
}

/// run_batch evaluates `recipes`, keyed by the goal each one computes.
/// A recipe may read from `sources` and from the outputs of other
/// recipes in the batch; recipes that don't depend on each other are
/// evaluated in parallel.
pub fn run_batch(
    runner: &Runner,
    recipes: &[(String, UnparsedRecipe)],
    sources: &HashMap<String, DataSeries>,
) -> BatchOutput {
    let mut results: Vec<Option<Result<RecipeOutput>>> = vec![None; recipes.len()];

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(recipes.len());
    for (i, (goal_id, _)) in recipes.iter().enumerate() {
        if index.contains_key(goal_id.as_str()) {
            results[i] = Some(Err(Error::new(
                ErrorCode::DuplicateGoal,
                Some(format!("Goal \"{goal_id}\" has more than one recipe.")),
            )));
        } else {
            index.insert(goal_id, i);
        }
    }

    let goals: Vec<&str> = recipes.iter().map(|(goal_id, _)| goal_id.as_str()).collect();
    let dependencies: Vec<Vec<usize>> = recipes
        .iter()
        .map(|(_, recipe)| {
            let deps: BTreeSet<usize> = recipe
                .variables
                .iter()
                .filter_map(|(_, source)| index.get(source.goal_id.as_str()).copied())
                .collect();
            deps.into_iter().collect()
        })
        .collect();

    let mut planner = Planner::new(&goals, &dependencies);
    let mut levels: Vec<Vec<usize>> = Vec::new();
    for i in 0..recipes.len() {
        if results[i].is_none() {
            planner.visit(i);
        }
    }
    for i in 0..recipes.len() {
        if results[i].is_some() {
            continue;
        }
        if let Some(path) = planner.cycles.get(&i) {
            results[i] = Some(Err(Error::new(
                ErrorCode::CircularDependency,
                Some(format!("Goal \"{}\" depends on itself: {path}.", goals[i])),
            )));
            continue;
        }
        let level = planner.levels[i];
        if levels.len() <= level {
            levels.resize(level + 1, Vec::new());
        }
        levels[level].push(i);
    }

    debug!(
        recipes = recipes.len(),
        levels = levels.len(),
        cycles = planner.cycles.len(),
        "running batch"
    );

    let mut available = sources.clone();
    for level in levels.iter() {
        let outputs: Vec<(usize, Result<RecipeOutput>)> = level
            .par_iter()
            .map(|&i| {
                let (goal_id, recipe) = &recipes[i];
                let failed = dependencies[i]
                    .iter()
                    .find(|&&dep| !matches!(results[dep], Some(Ok(_))));
                if let Some(&dep) = failed {
                    let details = format!(
                        "Goal \"{goal_id}\" reads from goal \"{}\", which could not be evaluated.",
                        goals[dep]
                    );
                    return (i, Err(Error::new(ErrorCode::UnknownDependency, Some(details))));
                }
                (i, runner.run(recipe, &available))
            })
            .collect();

        for (i, result) in outputs.into_iter() {
            if let Ok(ref output) = result {
                // readers see the output in the unit it was reported in
                let mut series = output.series.clone();
                series.unit = output.unit.clone();
                available.insert(goals[i].to_owned(), series);
            }
            results[i] = Some(result);
        }
    }

    BatchOutput {
        results: recipes
            .iter()
            .zip(results)
            .map(|((goal_id, _), result)| {
                let result = result.unwrap_or_else(|| {
                    Err(Error::new(
                        ErrorCode::UnknownDependency,
                        Some(format!("Goal \"{goal_id}\" was not evaluated.")),
                    ))
                });
                (goal_id.clone(), result)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::run_batch;
    use crate::common::{ErrorCode, ErrorKind};
    use crate::datamodel::{DataSeries, Settings, UnparsedRecipe, YearSpecs};
    use crate::recipe::Runner;

    fn runner() -> Runner {
        Runner::from_settings(&Settings {
            years: YearSpecs::new(2020, 2021),
            ..Default::default()
        })
        .unwrap()
    }

    fn sources() -> HashMap<String, DataSeries> {
        let base: DataSeries = [("val2020", Some(2.0)), ("val2021", Some(4.0))]
            .into_iter()
            .collect();
        HashMap::from([("base".to_owned(), base)])
    }

    fn recipe(goal_id: &str, eq: &str, variables: &[(&str, &str)]) -> (String, UnparsedRecipe) {
        (goal_id.to_owned(), UnparsedRecipe::new(eq, variables))
    }

    #[test]
    fn test_chain() {
        // listed before the recipe it reads from
        let recipes = vec![
            recipe("c", "${b} + ${base}", &[("b", "b"), ("base", "base")]),
            recipe("b", "${a} * 10", &[("a", "a")]),
            recipe("a", "${x} + 1", &[("x", "base")]),
        ];
        let output = run_batch(&runner(), &recipes, &sources());

        let ids: Vec<&str> = output.results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(vec!["c", "b", "a"], ids);

        let c = output.get("c").unwrap().as_ref().unwrap();
        assert_eq!(Some(32.0), c.series.get("val2020"));
        assert_eq!(Some(54.0), c.series.get("val2021"));
        let a = output.get("a").unwrap().as_ref().unwrap();
        assert_eq!(Some(3.0), a.series.get("val2020"));
    }

    #[test]
    fn test_cycles() {
        let recipes = vec![
            recipe("a", "${b} + 1", &[("b", "b")]),
            recipe("b", "${a} + 1", &[("a", "a")]),
            recipe("self", "${me} * 2", &[("me", "self")]),
            recipe("after", "${a} * 2", &[("a", "a")]),
            recipe("fine", "${base} * 2", &[("base", "base")]),
        ];
        let output = run_batch(&runner(), &recipes, &sources());

        for goal_id in ["a", "b", "self"] {
            let err = output.get(goal_id).unwrap().as_ref().unwrap_err();
            assert_eq!(ErrorKind::CircularDependency, err.kind, "{goal_id}");
        }
        let err = output.get("a").unwrap().as_ref().unwrap_err();
        assert!(err.message().contains("a -> b -> a"), "{}", err.message());
        let err = output.get("self").unwrap().as_ref().unwrap_err();
        assert!(err.message().contains("self -> self"));

        let err = output.get("after").unwrap().as_ref().unwrap_err();
        assert_eq!(ErrorCode::UnknownDependency, err.code);

        let fine = output.get("fine").unwrap().as_ref().unwrap();
        assert_eq!(Some(8.0), fine.series.get("val2021"));
    }

    #[test]
    fn test_cycle_reached_through_visited_goal() {
        // c is only reachable from a after b, which closes the loop
        // back to a, has already been visited
        let recipes = vec![
            recipe("a", "${b} + ${c}", &[("b", "b"), ("c", "c")]),
            recipe("b", "${a} + 1", &[("a", "a")]),
            recipe("c", "${b} + 1", &[("b", "b")]),
            recipe("reader", "${c} * 2", &[("c", "c")]),
        ];
        let output = run_batch(&runner(), &recipes, &sources());

        for goal_id in ["a", "b", "c"] {
            let err = output.get(goal_id).unwrap().as_ref().unwrap_err();
            assert_eq!(ErrorCode::CircularDependency, err.code, "{goal_id}");
        }
        let err = output.get("c").unwrap().as_ref().unwrap_err();
        assert!(err.message().contains("c -> b -> a -> c"), "{}", err.message());

        let err = output.get("reader").unwrap().as_ref().unwrap_err();
        assert_eq!(ErrorCode::UnknownDependency, err.code);
    }

    #[test]
    fn test_long_chain() {
        let mut recipes = vec![recipe("g0", "${x} + 1", &[("x", "base")])];
        for i in 1..5000 {
            let prev = format!("g{}", i - 1);
            recipes.push(recipe(&format!("g{i}"), "${p} + 1", &[("p", &prev)]));
        }
        recipes.reverse();
        let output = run_batch(&runner(), &recipes, &sources());

        let last = output.get("g4999").unwrap().as_ref().unwrap();
        assert_eq!(Some(5002.0), last.series.get("val2020"));
    }

    #[test]
    fn test_units_carry_to_readers() {
        let sources = HashMap::from([(
            "base".to_owned(),
            [("val2020", Some(2.0)), ("val2021", Some(4.0))]
                .into_iter()
                .collect::<DataSeries>()
                .with_unit("m"),
        )]);
        let recipes = vec![
            recipe("area", "${x} * ${x}", &[("x", "base")]),
            recipe("side", "${a} / ${x}", &[("a", "area"), ("x", "base")]),
        ];
        let output = run_batch(&runner(), &recipes, &sources);

        let area = output.get("area").unwrap().as_ref().unwrap();
        assert_eq!(None, area.series.unit);
        assert_eq!(Some("m^2".to_owned()), area.unit);
        let side = output.get("side").unwrap().as_ref().unwrap();
        assert_eq!(Some("m".to_owned()), side.unit);
        assert_eq!(Some(4.0), side.series.get("val2021"));
    }

    #[test]
    fn test_failed_dependency() {
        let recipes = vec![
            recipe("broken", "${x} +", &[("x", "base")]),
            recipe("reader", "${b} * 2", &[("b", "broken")]),
        ];
        let output = run_batch(&runner(), &recipes, &sources());

        let err = output.get("broken").unwrap().as_ref().unwrap_err();
        assert_eq!(ErrorKind::UnexpectedToken, err.kind);
        let err = output.get("reader").unwrap().as_ref().unwrap_err();
        assert_eq!(ErrorKind::UndefinedVariable, err.kind);
        assert!(err.message().contains("\"broken\""));
    }

    #[test]
    fn test_duplicate_goals() {
        let recipes = vec![
            recipe("a", "${x} + 1", &[("x", "base")]),
            recipe("a", "${x} + 2", &[("x", "base")]),
        ];
        let output = run_batch(&runner(), &recipes, &sources());

        assert_eq!(2, output.results.len());
        let first = output.results[0].1.as_ref().unwrap();
        assert_eq!(Some(3.0), first.series.get("val2020"));
        let err = output.results[1].1.as_ref().unwrap_err();
        assert_eq!(ErrorCode::DuplicateGoal, err.code);
    }

    #[test]
    fn test_output_json() {
        let recipes = vec![
            recipe("ok", "${x} / 2", &[("x", "base")]),
            recipe("bad", "(${x}", &[("x", "base")]),
        ];
        let output = run_batch(&runner(), &recipes, &sources());
        let value = serde_json::to_value(&output).unwrap();

        assert_eq!(
            json!({"val2020": 1.0, "val2021": 2.0}),
            value["ok"]["output"]["series"]
        );
        assert_eq!(json!("UnbalancedParens"), value["bad"]["error"]["kind"]);
        assert!(value["bad"].get("output").is_none());
    }
}
