// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod common;
pub mod datamodel;

pub use common::{EquationError, EquationResult, Error, ErrorCode, ErrorKind, Result};
pub use datamodel::{
    DataSeries, NormalizedRecipe, Settings, Unit, UnitMap, UnparsedRecipe, VariableSource,
    YearSpecs,
};
