//! Property and parameter schemas declared by modules

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a person-level property column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Bool,
    Real,
    Int,
    Date,
    /// Categorical with a fixed, ordered category set
    Categorical(Vec<String>),
}

impl PropertyType {
    /// Build a categorical type from string slices
    pub fn categorical(categories: &[&str]) -> Self {
        PropertyType::Categorical(categories.iter().map(|c| c.to_string()).collect())
    }

    /// Name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyType::Bool => "bool",
            PropertyType::Real => "real",
            PropertyType::Int => "int",
            PropertyType::Date => "date",
            PropertyType::Categorical(_) => "categorical",
        }
    }
}

/// A single cell value read from or written to the entity table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Real(f64),
    Int(i64),
    Date(Option<NaiveDate>),
    Category(String),
}

impl PropertyValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Real(_) => "real",
            PropertyValue::Int(_) => "int",
            PropertyValue::Date(_) => "date",
            PropertyValue::Category(_) => "categorical",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Real(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Date(Some(d)) => write!(f, "{}", d),
            PropertyValue::Date(None) => write!(f, "NaT"),
            PropertyValue::Category(c) => write!(f, "{}", c),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Real(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<NaiveDate> for PropertyValue {
    fn from(v: NaiveDate) -> Self {
        PropertyValue::Date(Some(v))
    }
}

impl From<Option<NaiveDate>> for PropertyValue {
    fn from(v: Option<NaiveDate>) -> Self {
        PropertyValue::Date(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Category(v.to_string())
    }
}

/// Declaration of one property column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyType,
    pub description: String,
}

impl PropertyDef {
    pub fn new(name: &str, kind: PropertyType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
        }
    }
}

/// Type of a module parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    Bool,
    Real,
    Int,
    Date,
    Categorical,
    String,
    List,
    /// Already-typed lookup table
    Table,
}

/// Declaration of one module parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub kind: ParameterType,
    pub description: String,
}

impl ParameterDef {
    pub fn new(name: &str, kind: ParameterType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
        }
    }
}
