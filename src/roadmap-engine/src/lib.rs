// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod ast;
pub mod batch;
pub mod common;
pub mod interpreter;
pub mod lexer;
pub mod normalize;
pub mod parser;
pub mod recipe;
pub mod units;
pub mod units_check;
pub mod validate;

#[cfg(test)]
mod normalize_proptest;

pub use roadmap_core::datamodel;

pub use self::batch::{BatchOutput, run_batch};
pub use self::common::{Error, ErrorCode, ErrorKind, Result};
pub use self::interpreter::{Interpreter, StepError, evaluate};
pub use self::normalize::normalize;
pub use self::recipe::{CheckOutput, RecipeOutput, Runner, check, run};
pub use self::units::{Context, ScaledUnit};
pub use self::units_check::Units;
pub use self::validate::{parse_recipe, parse_recipes, validate, validate_recipe};
