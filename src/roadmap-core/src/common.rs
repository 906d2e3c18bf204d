// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// The stable, caller-facing class of a fatal recipe error.  The HTTP
/// layer maps these to status codes, so the serialized names must not
/// change.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "ShapeError")]
    Shape,
    UndefinedVariable,
    UnexpectedToken,
    UnbalancedParens,
    UnitMismatch,
    UnitDefinition,
    CircularDependency,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ErrorKind::Shape => "ShapeError",
            ErrorKind::UndefinedVariable => "UndefinedVariable",
            ErrorKind::UnexpectedToken => "UnexpectedToken",
            ErrorKind::UnbalancedParens => "UnbalancedParens",
            ErrorKind::UnitMismatch => "UnitMismatch",
            ErrorKind::UnitDefinition => "UnitDefinition",
            ErrorKind::CircularDependency => "CircularDependency",
        };
        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // shape of the recipe document
    InvalidJson,
    RecipeIsString,
    NotAnObject,
    MissingEquation,
    EquationNotString,
    EmptyEquation,
    EquationTooLong,
    NestingTooDeep,
    MissingVariables,
    VariablesNotObject,
    EmptyVariableName,
    DuplicateVariable,
    BadVariableSource,
    MissingGoalId,
    BadScale,
    BadYearSpecs,
    BadSettings,
    DuplicateGoal,
    // references
    UndefinedVariable,
    DoesNotExist,
    MissingSource,
    UnknownDependency,
    // grammar
    UnrecognizedToken,
    UnrecognizedEof,
    ExtraToken,
    ExpectedNumber,
    UnclosedPlaceholder,
    BadPlaceholder,
    UnclosedParen,
    UnmatchedParen,
    // units
    UnitMismatch,
    DuplicateUnit,
    BadBinaryOpInUnits,
    BadUnit,
    ExpectedInteger,
    BadUnitExponent,
    BadUnitFactor,
    CircularUnit,
    UnitDefinitionErrors,
    // batches
    CircularDependency,
}

impl ErrorCode {
    pub fn kind(self) -> ErrorKind {
        use ErrorCode::*;
        match self {
            InvalidJson | RecipeIsString | NotAnObject | MissingEquation | EquationNotString
            | EmptyEquation | EquationTooLong | NestingTooDeep | MissingVariables
            | VariablesNotObject | EmptyVariableName | DuplicateVariable | BadVariableSource
            | MissingGoalId | BadScale | BadYearSpecs | BadSettings | DuplicateGoal => {
                ErrorKind::Shape
            }
            UndefinedVariable | DoesNotExist | MissingSource | UnknownDependency => {
                ErrorKind::UndefinedVariable
            }
            UnrecognizedToken | UnrecognizedEof | ExtraToken | ExpectedNumber
            | UnclosedPlaceholder | BadPlaceholder => ErrorKind::UnexpectedToken,
            UnclosedParen | UnmatchedParen => ErrorKind::UnbalancedParens,
            UnitMismatch => ErrorKind::UnitMismatch,
            DuplicateUnit | BadBinaryOpInUnits | BadUnit | ExpectedInteger
            | BadUnitExponent | BadUnitFactor | CircularUnit | UnitDefinitionErrors => {
                ErrorKind::UnitDefinition
            }
            CircularDependency => ErrorKind::CircularDependency,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            InvalidJson => "invalid_json",
            RecipeIsString => "recipe_is_string",
            NotAnObject => "not_an_object",
            MissingEquation => "missing_equation",
            EquationNotString => "equation_not_string",
            EmptyEquation => "empty_equation",
            EquationTooLong => "equation_too_long",
            NestingTooDeep => "nesting_too_deep",
            MissingVariables => "missing_variables",
            VariablesNotObject => "variables_not_object",
            EmptyVariableName => "empty_variable_name",
            DuplicateVariable => "duplicate_variable",
            BadVariableSource => "bad_variable_source",
            MissingGoalId => "missing_goal_id",
            BadScale => "bad_scale",
            BadYearSpecs => "bad_year_specs",
            BadSettings => "bad_settings",
            DuplicateGoal => "duplicate_goal",
            UndefinedVariable => "undefined_variable",
            DoesNotExist => "does_not_exist",
            MissingSource => "missing_source",
            UnknownDependency => "unknown_dependency",
            UnrecognizedToken => "unrecognized_token",
            UnrecognizedEof => "unrecognized_eof",
            ExtraToken => "extra_token",
            ExpectedNumber => "expected_number",
            UnclosedPlaceholder => "unclosed_placeholder",
            BadPlaceholder => "bad_placeholder",
            UnclosedParen => "unclosed_paren",
            UnmatchedParen => "unmatched_paren",
            UnitMismatch => "unit_mismatch",
            DuplicateUnit => "duplicate_unit",
            BadBinaryOpInUnits => "bad_binary_op_in_units",
            BadUnit => "bad_unit",
            ExpectedInteger => "expected_integer",
            BadUnitExponent => "bad_unit_exponent",
            BadUnitFactor => "bad_unit_factor",
            CircularUnit => "circular_unit",
            UnitDefinitionErrors => "unit_definition_errors",
            CircularDependency => "circular_dependency",
        };

        write!(f, "{name}")
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// EquationError is a problem found while lexing or parsing a single
/// equation (or unit string), located by byte offsets into that text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EquationError {
    pub start: u16,
    pub end: u16,
    pub code: ErrorCode,
}

impl fmt::Display for EquationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.end, self.code)
    }
}

impl EquationError {
    /// into_error attaches a human readable message, quoting the part of
    /// `text` the error points at.
    pub fn into_error(self, text: &str) -> Error {
        let start = usize::from(self.start).min(text.len());
        let end = usize::from(self.end).clamp(start, text.len());
        let fragment = text.get(start..end).unwrap_or("");
        let details = match self.code {
            ErrorCode::UnrecognizedEof => {
                format!("Unexpected end of equation at position {start}.")
            }
            ErrorCode::UnclosedParen => {
                format!("Unbalanced parentheses: \"(\" at position {start} is never closed.")
            }
            ErrorCode::UnmatchedParen => {
                format!("Unbalanced parentheses: \")\" at position {start} has no matching \"(\".")
            }
            ErrorCode::UnclosedPlaceholder => {
                format!("Unterminated variable placeholder \"{fragment}\" at position {start}.")
            }
            ErrorCode::BadPlaceholder => {
                format!("Invalid variable placeholder \"{fragment}\" at position {start}.")
            }
            ErrorCode::EquationTooLong => "Equation is too long.".to_owned(),
            ErrorCode::NestingTooDeep => {
                format!("Equation is nested too deeply at position {start}.")
            }
            ErrorCode::ExpectedNumber => {
                format!("Invalid number \"{fragment}\" at position {start}.")
            }
            ErrorCode::ExpectedInteger | ErrorCode::BadUnitExponent => {
                format!("Expected a small integer exponent, found \"{fragment}\".")
            }
            ErrorCode::BadBinaryOpInUnits => {
                format!("Units can only be multiplied or divided: \"{fragment}\".")
            }
            ErrorCode::BadUnitFactor => {
                format!("Unit scale factors must be positive and finite: \"{fragment}\".")
            }
            _ => format!("Unexpected token \"{fragment}\" at position {start}."),
        };
        Error::new(self.code, Some(details))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind: code.kind(),
            code,
            details,
        }
    }

    /// message is what gets shown to the author of a broken recipe.
    pub fn message(&self) -> String {
        match self.details {
            Some(ref details) => details.clone(),
            None => self.code.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", self.kind, self.code, details),
            None => write!(f, "{}{{{}}}", self.kind, self.code),
        }
    }
}

impl error::Error for Error {}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Error", 3)?;
        s.serialize_field("kind", &self.kind)?;
        s.serialize_field("code", &self.code)?;
        s.serialize_field("message", &self.message())?;
        s.end()
    }
}

pub type Result<T> = result::Result<T, Error>;
pub type EquationResult<T> = result::Result<T, EquationError>;

#[test]
fn test_error_kinds() {
    assert_eq!(ErrorKind::Shape, ErrorCode::EmptyEquation.kind());
    assert_eq!(ErrorKind::UndefinedVariable, ErrorCode::DoesNotExist.kind());
    assert_eq!(ErrorKind::UnexpectedToken, ErrorCode::ExtraToken.kind());
    assert_eq!(ErrorKind::UnbalancedParens, ErrorCode::UnclosedParen.kind());
    assert_eq!(ErrorKind::UnitDefinition, ErrorCode::DuplicateUnit.kind());
    assert_eq!("ShapeError", ErrorKind::Shape.to_string());
}

#[test]
fn test_error_serialization() {
    let err = Error::new(
        ErrorCode::UndefinedVariable,
        Some("Variable \"b\" is used in the equation but not defined in variables.".to_owned()),
    );
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!("UndefinedVariable", json["kind"]);
    assert_eq!("undefined_variable", json["code"]);
    assert_eq!(
        "Variable \"b\" is used in the equation but not defined in variables.",
        json["message"]
    );

    let err = Error::new(ErrorCode::MissingEquation, None);
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!("ShapeError", json["kind"]);
    assert_eq!("missing_equation", json["message"]);
    assert_eq!("ShapeError{missing_equation}", err.to_string());
}

#[test]
fn test_equation_error_messages() {
    let eq = "${v0} @ 2";
    let err = EquationError {
        start: 6,
        end: 7,
        code: ErrorCode::UnrecognizedToken,
    }
    .into_error(eq);
    assert_eq!(ErrorKind::UnexpectedToken, err.kind);
    assert!(err.message().contains("\"@\""));

    // spans past the end of the text are clamped rather than panicking
    let err = EquationError {
        start: 40,
        end: 41,
        code: ErrorCode::UnrecognizedEof,
    }
    .into_error(eq);
    assert!(err.message().contains("end of equation"));
}
