// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeMap, HashSet};
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::common::{Error, ErrorCode, Result};

/// UnitMap is a product of base units raised to integer powers.  An
/// empty map is dimensionless.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct UnitMap {
    pub map: BTreeMap<String, i32>,
}

impl UnitMap {
    pub fn new() -> UnitMap {
        Default::default()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn reciprocal(mut self) -> Self {
        for (_id, exp) in self.map.iter_mut() {
            *exp *= -1;
        }
        self
    }

    pub fn exp(mut self, exp: i32) -> Self {
        if exp == 0 {
            return UnitMap::new();
        }
        for (_id, unit) in self.map.iter_mut() {
            *unit *= exp;
        }

        self
    }
}

impl std::ops::Div for UnitMap {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn div(self, rhs: Self) -> Self::Output {
        self * rhs.reciprocal()
    }
}

impl std::ops::Mul for UnitMap {
    type Output = Self;

    fn mul(mut self, rhs: Self) -> Self::Output {
        for (unit, n) in rhs.map.into_iter() {
            let new_value = match self.map.get(&unit) {
                None => n,
                Some(m) => n + *m,
            };

            if new_value == 0 {
                self.map.remove(&unit);
            } else {
                self.map.insert(unit, new_value);
            }
        }

        self
    }
}

impl Display for UnitMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut written = false;
        for (unit, exp) in self.map.iter().filter(|(_, exp)| **exp > 0) {
            if written {
                write!(f, "*")?;
            }
            write!(f, "{unit}")?;
            if *exp > 1 {
                write!(f, "^{exp}")?;
            }
            written = true;
        }

        for (unit, exp) in self.map.iter().filter(|(_, exp)| **exp < 0) {
            if !written {
                write!(f, "1")?;
                written = true;
            }
            write!(f, "/{unit}")?;
            if exp.abs() > 1 {
                write!(f, "^{}", exp.abs())?;
            }
        }

        if !written {
            write!(f, "dmnl")?;
        }

        Ok(())
    }
}

impl FromIterator<(String, i32)> for UnitMap {
    fn from_iter<I: IntoIterator<Item = (String, i32)>>(iter: I) -> Self {
        UnitMap {
            map: iter.into_iter().filter(|(_, exp)| *exp != 0).collect(),
        }
    }
}

/// Unit is a named unit definition.  Without an equation it declares a
/// new base unit; with one (e.g. `1000 * tCO2e`) it is derived from
/// other units, optionally scaled.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Unit {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equation: Option<String>,
    pub disabled: bool,
    pub aliases: Vec<String>,
}

/// VariableSource says where a recipe variable's values come from.
#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSource {
    pub goal_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

impl VariableSource {
    pub fn new(goal_id: &str) -> Self {
        VariableSource {
            goal_id: goal_id.to_owned(),
            scale: None,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale.unwrap_or(1.0)
    }
}

struct OrderedVariables<'a>(&'a [(String, VariableSource)]);

impl Serialize for OrderedVariables<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, source) in self.0.iter() {
            map.serialize_entry(name, source)?;
        }
        map.end()
    }
}

/// UnparsedRecipe is a derived data series definition as its author
/// wrote it.  Variables are kept in document order, which determines
/// the canonical names they are assigned.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct UnparsedRecipe {
    pub eq: String,
    pub variables: Vec<(String, VariableSource)>,
}

impl UnparsedRecipe {
    pub fn new(eq: &str, variables: &[(&str, &str)]) -> Self {
        UnparsedRecipe {
            eq: eq.to_owned(),
            variables: variables
                .iter()
                .map(|(name, goal_id)| (name.to_string(), VariableSource::new(goal_id)))
                .collect(),
        }
    }

    pub fn get_variable(&self, name: &str) -> Option<&VariableSource> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, source)| source)
    }
}

impl Serialize for UnparsedRecipe {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("eq", &self.eq)?;
        map.serialize_entry("variables", &OrderedVariables(&self.variables))?;
        map.end()
    }
}

/// NormalizedRecipe has the same shape as an UnparsedRecipe, but every
/// variable has been renamed to its canonical name (`v0`, `v1`, ...).
/// `renames` is the (original, canonical) table in assignment order.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct NormalizedRecipe {
    pub eq: String,
    pub variables: Vec<(String, VariableSource)>,
    pub renames: Vec<(String, String)>,
}

impl NormalizedRecipe {
    pub fn get_variable(&self, canonical: &str) -> Option<&VariableSource> {
        self.variables
            .iter()
            .find(|(n, _)| n == canonical)
            .map(|(_, source)| source)
    }

    /// original_name maps a canonical name back to what the author typed.
    pub fn original_name<'a>(&'a self, canonical: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(_, c)| c == canonical)
            .map(|(original, _)| original.as_str())
            .unwrap_or(canonical)
    }

    pub fn as_unparsed(&self) -> UnparsedRecipe {
        UnparsedRecipe {
            eq: self.eq.clone(),
            variables: self.variables.clone(),
        }
    }
}

impl Serialize for NormalizedRecipe {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("eq", &self.eq)?;
        map.serialize_entry("variables", &OrderedVariables(&self.variables))?;
        map.serialize_entry("renames", &self.renames)?;
        map.end()
    }
}

/// DataSeries is one goal's yearly values, keyed by year-key (e.g.
/// `val2020`).  A missing year-key and an explicit `null` both mean
/// there is no data for that year.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct DataSeries {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub values: IndexMap<String, Option<f64>>,
}

impl DataSeries {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_owned());
        self
    }

    pub fn get(&self, year_key: &str) -> Option<f64> {
        self.values.get(year_key).copied().flatten()
    }

    pub fn insert(&mut self, year_key: &str, value: Option<f64>) {
        self.values.insert(year_key.to_owned(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, Option<f64>)> for DataSeries {
    fn from_iter<I: IntoIterator<Item = (&'a str, Option<f64>)>>(iter: I) -> Self {
        DataSeries {
            unit: None,
            values: iter
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
        }
    }
}

const MAX_YEARS: i64 = 1000;

/// YearSpecs describes the canonical, ordered sequence of year-keys a
/// data series is evaluated over.  An explicit `keys` list takes
/// precedence over the `start..=stop` range.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct YearSpecs {
    pub start: i32,
    pub stop: i32,
    pub prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

impl Default for YearSpecs {
    fn default() -> Self {
        YearSpecs {
            start: 1990,
            stop: 2050,
            prefix: "val".to_owned(),
            keys: None,
        }
    }
}

impl YearSpecs {
    pub fn new(start: i32, stop: i32) -> Self {
        YearSpecs {
            start,
            stop,
            ..Default::default()
        }
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        if let Some(ref keys) = self.keys {
            let mut seen = HashSet::new();
            for key in keys.iter() {
                if key.is_empty() {
                    return Err(Error::new(
                        ErrorCode::BadYearSpecs,
                        Some("Year keys must not be empty.".to_owned()),
                    ));
                }
                if !seen.insert(key.as_str()) {
                    return Err(Error::new(
                        ErrorCode::BadYearSpecs,
                        Some(format!("Year key \"{key}\" is listed more than once.")),
                    ));
                }
            }
            return Ok(keys.clone());
        }

        if self.start > self.stop {
            return Err(Error::new(
                ErrorCode::BadYearSpecs,
                Some(format!(
                    "Year range starts at {} but stops at {}.",
                    self.start, self.stop
                )),
            ));
        }
        if i64::from(self.stop) - i64::from(self.start) >= MAX_YEARS {
            return Err(Error::new(
                ErrorCode::BadYearSpecs,
                Some(format!("Year ranges may span at most {MAX_YEARS} years.")),
            ));
        }

        Ok((self.start..=self.stop)
            .map(|year| format!("{}{}", self.prefix, year))
            .collect())
    }
}

/// Settings are the knobs the surrounding application configures the
/// recipe engine with.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub years: YearSpecs,
    pub units: Vec<Unit>,
}

impl Settings {
    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents)
            .map_err(|err| Error::new(ErrorCode::BadSettings, Some(format!("{err}"))))
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::*;

    fn unit_map(parts: &[(&str, i32)]) -> UnitMap {
        parts.iter().map(|(u, e)| (u.to_string(), *e)).collect()
    }

    #[test]
    fn test_unit_map_arithmetic() {
        let t = unit_map(&[("tCO2e", 1)]);
        let person = unit_map(&[("person", 1)]);

        let per_capita = t.clone() / person.clone();
        assert_eq!("tCO2e/person", per_capita.to_string());

        let back = per_capita * person;
        assert_eq!(t, back);

        let dmnl = t.clone() / t;
        assert!(dmnl.is_empty());
        assert_eq!("dmnl", dmnl.to_string());

        let area = unit_map(&[("m", 1)]).exp(2);
        assert_eq!("m^2", area.to_string());
        assert_eq!("1/m^2", area.reciprocal().to_string());
    }

    #[test]
    fn test_data_series_json() {
        let series: DataSeries =
            serde_json::from_str(r#"{"unit": "ktCO2e", "val2020": 10, "val2021": null}"#).unwrap();
        assert_eq!(Some("ktCO2e".to_owned()), series.unit);
        assert!(approx_eq!(f64, 10.0, series.get("val2020").unwrap()));
        assert_eq!(None, series.get("val2021"));
        assert_eq!(None, series.get("val2022"));
        assert_eq!(2, series.len());

        let series: DataSeries = serde_json::from_str(r#"{"val2020": 1.5}"#).unwrap();
        assert_eq!(None, series.unit);
        let json = serde_json::to_string(&series).unwrap();
        assert_eq!(r#"{"val2020":1.5}"#, json);
    }

    #[test]
    fn test_year_specs() {
        let keys = YearSpecs::new(2020, 2022).keys().unwrap();
        assert_eq!(vec!["val2020", "val2021", "val2022"], keys);

        let keys = YearSpecs::default().keys().unwrap();
        assert_eq!(61, keys.len());
        assert_eq!("val1990", keys[0]);
        assert_eq!("val2050", keys[60]);

        let err = YearSpecs::new(2030, 2020).keys().unwrap_err();
        assert_eq!(ErrorCode::BadYearSpecs, err.code);

        let err = YearSpecs::new(i32::MIN, i32::MAX).keys().unwrap_err();
        assert_eq!(ErrorCode::BadYearSpecs, err.code);

        let specs = YearSpecs {
            keys: Some(vec!["a".to_owned(), "a".to_owned()]),
            ..Default::default()
        };
        assert_eq!(ErrorCode::BadYearSpecs, specs.keys().unwrap_err().code);
    }

    #[test]
    fn test_recipe_serialization_keeps_order() {
        let recipe = UnparsedRecipe::new("${z} + ${a}", &[("z", "g2"), ("a", "g1")]);
        let json = serde_json::to_string(&recipe).unwrap();
        assert_eq!(
            r#"{"eq":"${z} + ${a}","variables":{"z":{"goalId":"g2"},"a":{"goalId":"g1"}}}"#,
            json
        );
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_json(r#"{"years": {"start": 2020}}"#).unwrap();
        assert_eq!(2020, settings.years.start);
        assert_eq!(2050, settings.years.stop);
        assert_eq!("val", settings.years.prefix);
        assert!(settings.units.is_empty());

        let err = Settings::from_json("[1, 2]").unwrap_err();
        assert_eq!(ErrorCode::BadSettings, err.code);
    }
}
