//! Entity table: columnar store of persons
//!
//! Every property is a column owned by the module that declared it. Rows are
//! addressed by [`PersonId`], which is a stable, permanently increasing row
//! index: rows are never removed, a death only flips `is_alive`.
//!
//! Writes go through a [`ColumnWriter`], which carries the writing module's
//! identity and refuses writes to columns that module does not own (or has not
//! been granted shared write access to).

use crate::models::property::{PropertyDef, PropertyType, PropertyValue};
use crate::registry::ModuleId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use thiserror::Error;

/// Name of the built-in liveness column
pub const IS_ALIVE: &str = "is_alive";

/// Row index of a person in the entity table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(pub usize);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised by entity-table access
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PopulationError {
    #[error("unknown property '{0}'")]
    UnknownProperty(String),

    #[error("{module} may not write property '{property}' owned by {owner}")]
    NotOwner {
        property: String,
        module: ModuleId,
        owner: ModuleId,
    },

    #[error("property '{property}' holds {expected} values, got {found}")]
    TypeMismatch {
        property: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("'{value}' is not a category of property '{property}'")]
    UnknownCategory { property: String, value: String },

    #[error("person {0} does not exist")]
    UnknownPerson(PersonId),

    #[error("person {0} is dead and cannot be made alive again")]
    Resurrection(PersonId),

    #[error("property '{0}' is already declared")]
    DuplicateProperty(String),
}

// ============================================================================
// Column storage
// ============================================================================

/// Categorical cells are stored as `u16` codes
pub const MAX_CATEGORIES: usize = u16::MAX as usize + 1;

/// Why a category set cannot back a column, if it cannot
pub fn invalid_category_set(categories: &[String]) -> Option<String> {
    if categories.is_empty() {
        return Some("a categorical property needs at least one category".to_string());
    }
    if categories.len() > MAX_CATEGORIES {
        return Some(format!(
            "{} categories exceed the limit of {}",
            categories.len(),
            MAX_CATEGORIES
        ));
    }
    None
}

#[derive(Debug, Clone)]
enum ColumnData {
    Bool(Vec<bool>),
    Real(Vec<f64>),
    Int(Vec<i64>),
    Date(Vec<Option<NaiveDate>>),
    Categorical {
        categories: Vec<String>,
        codes: Vec<u16>,
    },
}

impl ColumnData {
    fn for_kind(kind: &PropertyType, len: usize) -> Self {
        match kind {
            PropertyType::Bool => ColumnData::Bool(vec![false; len]),
            PropertyType::Real => ColumnData::Real(vec![f64::NAN; len]),
            PropertyType::Int => ColumnData::Int(vec![0; len]),
            PropertyType::Date => ColumnData::Date(vec![None; len]),
            PropertyType::Categorical(categories) => ColumnData::Categorical {
                categories: categories.clone(),
                codes: vec![0; len],
            },
        }
    }

    fn grow(&mut self, n: usize) {
        match self {
            ColumnData::Bool(v) => v.extend(std::iter::repeat(false).take(n)),
            ColumnData::Real(v) => v.extend(std::iter::repeat(f64::NAN).take(n)),
            ColumnData::Int(v) => v.extend(std::iter::repeat(0).take(n)),
            ColumnData::Date(v) => v.extend(std::iter::repeat(None).take(n)),
            ColumnData::Categorical { codes, .. } => codes.extend(std::iter::repeat(0).take(n)),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ColumnData::Bool(_) => "bool",
            ColumnData::Real(_) => "real",
            ColumnData::Int(_) => "int",
            ColumnData::Date(_) => "date",
            ColumnData::Categorical { .. } => "categorical",
        }
    }

    fn value(&self, row: usize) -> PropertyValue {
        match self {
            ColumnData::Bool(v) => PropertyValue::Bool(v[row]),
            ColumnData::Real(v) => PropertyValue::Real(v[row]),
            ColumnData::Int(v) => PropertyValue::Int(v[row]),
            ColumnData::Date(v) => PropertyValue::Date(v[row]),
            ColumnData::Categorical { categories, codes } => {
                PropertyValue::Category(categories[codes[row] as usize].clone())
            }
        }
    }

    /// Convert `value` into this column's storage representation
    fn encode(&self, property: &str, value: PropertyValue) -> Result<Cell, PopulationError> {
        match (self, value) {
            (ColumnData::Bool(_), PropertyValue::Bool(v)) => Ok(Cell::Bool(v)),
            (ColumnData::Real(_), PropertyValue::Real(v)) => Ok(Cell::Real(v)),
            (ColumnData::Int(_), PropertyValue::Int(v)) => Ok(Cell::Int(v)),
            (ColumnData::Date(_), PropertyValue::Date(v)) => Ok(Cell::Date(v)),
            (ColumnData::Categorical { categories, .. }, PropertyValue::Category(c)) => {
                match categories.iter().position(|known| *known == c) {
                    Some(code) => Ok(Cell::Code(code as u16)),
                    None => Err(PopulationError::UnknownCategory {
                        property: property.to_string(),
                        value: c,
                    }),
                }
            }
            (data, other) => Err(PopulationError::TypeMismatch {
                property: property.to_string(),
                expected: data.kind_name(),
                found: other.kind_name(),
            }),
        }
    }

    fn store(&mut self, row: usize, cell: Cell) {
        match (self, cell) {
            (ColumnData::Bool(v), Cell::Bool(x)) => v[row] = x,
            (ColumnData::Real(v), Cell::Real(x)) => v[row] = x,
            (ColumnData::Int(v), Cell::Int(x)) => v[row] = x,
            (ColumnData::Date(v), Cell::Date(x)) => v[row] = x,
            (ColumnData::Categorical { codes, .. }, Cell::Code(x)) => codes[row] = x,
            // encode() only produces cells matching the column
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Cell {
    Bool(bool),
    Real(f64),
    Int(i64),
    Date(Option<NaiveDate>),
    Code(u16),
}

#[derive(Debug, Clone)]
struct Column {
    def: PropertyDef,
    owner: ModuleId,
    shared_writers: Vec<ModuleId>,
    data: ColumnData,
}

impl Column {
    fn may_write(&self, module: ModuleId) -> bool {
        self.owner == module || self.shared_writers.contains(&module)
    }
}

// ============================================================================
// Population
// ============================================================================

/// The entity table
#[derive(Debug, Clone)]
pub struct Population {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    len: usize,
}

impl Default for Population {
    fn default() -> Self {
        Self::new()
    }
}

impl Population {
    /// Create an empty table holding only the `is_alive` column
    pub fn new() -> Self {
        let mut population = Self {
            columns: Vec::new(),
            index: HashMap::new(),
            len: 0,
        };
        population.columns.push(Column {
            def: PropertyDef::new(IS_ALIVE, PropertyType::Bool, "Whether the person is alive"),
            owner: ModuleId::KERNEL,
            shared_writers: Vec::new(),
            data: ColumnData::Bool(Vec::new()),
        });
        population.index.insert(IS_ALIVE.to_string(), 0);
        population
    }

    /// Add a column owned by `owner`; existing rows get the type's default
    pub fn declare(&mut self, def: PropertyDef, owner: ModuleId) -> Result<(), PopulationError> {
        if self.index.contains_key(&def.name) {
            return Err(PopulationError::DuplicateProperty(def.name));
        }
        let data = ColumnData::for_kind(&def.kind, self.len);
        self.index.insert(def.name.clone(), self.columns.len());
        self.columns.push(Column {
            def,
            owner,
            shared_writers: Vec::new(),
            data,
        });
        Ok(())
    }

    /// Let `module` write a column it does not own
    pub fn grant_shared_write(&mut self, name: &str, module: ModuleId) -> Result<(), PopulationError> {
        let idx = self.column_index(name)?;
        let column = &mut self.columns[idx];
        if !column.shared_writers.contains(&module) {
            column.shared_writers.push(module);
        }
        Ok(())
    }

    /// Append `n` rows with default values, alive. Returns the first new id.
    pub fn grow(&mut self, n: usize) -> PersonId {
        let first = PersonId(self.len);
        for column in &mut self.columns {
            column.data.grow(n);
        }
        if let ColumnData::Bool(alive) = &mut self.columns[0].data {
            for flag in alive.iter_mut().skip(first.0) {
                *flag = true;
            }
        }
        self.len += n;
        first
    }

    /// Number of rows ever created (alive and dead)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every row id, dead or alive, in row order
    pub fn ids(&self) -> impl Iterator<Item = PersonId> {
        (0..self.len).map(PersonId)
    }

    /// False for dead persons and for ids that do not exist
    pub fn is_alive(&self, person: PersonId) -> bool {
        match &self.columns[0].data {
            ColumnData::Bool(alive) => alive.get(person.0).copied().unwrap_or(false),
            _ => false,
        }
    }

    pub fn alive_ids(&self) -> Vec<PersonId> {
        self.ids().filter(|&p| self.is_alive(p)).collect()
    }

    pub fn num_alive(&self) -> usize {
        self.ids().filter(|&p| self.is_alive(p)).count()
    }

    /// Column names in declaration order
    pub fn property_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.def.name.as_str()).collect()
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn owner_of(&self, name: &str) -> Option<ModuleId> {
        self.index.get(name).map(|&i| self.columns[i].owner)
    }

    pub fn property_def(&self, name: &str) -> Option<&PropertyDef> {
        self.index.get(name).map(|&i| &self.columns[i].def)
    }

    /// Whole column as values, in row order
    pub fn column_values(&self, name: &str) -> Option<Vec<PropertyValue>> {
        let column = &self.columns[*self.index.get(name)?];
        Some((0..self.len).map(|row| column.data.value(row)).collect())
    }

    /// Read one cell
    pub fn get(&self, person: PersonId, name: &str) -> Result<PropertyValue, PopulationError> {
        let idx = self.column_index(name)?;
        self.check_row(person)?;
        Ok(self.columns[idx].data.value(person.0))
    }

    pub fn get_bool(&self, person: PersonId, name: &str) -> Result<bool, PopulationError> {
        match self.get(person, name)? {
            PropertyValue::Bool(v) => Ok(v),
            other => Err(self.mismatch(name, "bool", &other)),
        }
    }

    pub fn get_real(&self, person: PersonId, name: &str) -> Result<f64, PopulationError> {
        match self.get(person, name)? {
            PropertyValue::Real(v) => Ok(v),
            other => Err(self.mismatch(name, "real", &other)),
        }
    }

    pub fn get_int(&self, person: PersonId, name: &str) -> Result<i64, PopulationError> {
        match self.get(person, name)? {
            PropertyValue::Int(v) => Ok(v),
            other => Err(self.mismatch(name, "int", &other)),
        }
    }

    pub fn get_date(&self, person: PersonId, name: &str) -> Result<Option<NaiveDate>, PopulationError> {
        match self.get(person, name)? {
            PropertyValue::Date(v) => Ok(v),
            other => Err(self.mismatch(name, "date", &other)),
        }
    }

    pub fn get_category(&self, person: PersonId, name: &str) -> Result<String, PopulationError> {
        match self.get(person, name)? {
            PropertyValue::Category(v) => Ok(v),
            other => Err(self.mismatch(name, "categorical", &other)),
        }
    }

    /// Write handle scoped to `module`'s columns
    pub fn writer(&mut self, module: ModuleId) -> ColumnWriter<'_> {
        ColumnWriter {
            population: self,
            module,
        }
    }

    fn column_index(&self, name: &str) -> Result<usize, PopulationError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| PopulationError::UnknownProperty(name.to_string()))
    }

    fn check_row(&self, person: PersonId) -> Result<(), PopulationError> {
        if person.0 < self.len {
            Ok(())
        } else {
            Err(PopulationError::UnknownPerson(person))
        }
    }

    fn mismatch(&self, name: &str, wanted: &'static str, found: &PropertyValue) -> PopulationError {
        PopulationError::TypeMismatch {
            property: name.to_string(),
            expected: wanted,
            found: found.kind_name(),
        }
    }

    fn write(
        &mut self,
        module: ModuleId,
        person: PersonId,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), PopulationError> {
        let idx = self.column_index(name)?;
        self.check_row(person)?;
        let column = &self.columns[idx];
        if !column.may_write(module) {
            return Err(PopulationError::NotOwner {
                property: name.to_string(),
                module,
                owner: column.owner,
            });
        }
        if idx == 0 && value == PropertyValue::Bool(true) && !self.is_alive(person) {
            return Err(PopulationError::Resurrection(person));
        }
        let cell = column.data.encode(name, value)?;
        self.columns[idx].data.store(person.0, cell);
        Ok(())
    }
}

/// Capability to write the columns one module owns
///
/// Derefs to [`Population`] so reads go through the same handle.
pub struct ColumnWriter<'a> {
    population: &'a mut Population,
    module: ModuleId,
}

impl<'a> ColumnWriter<'a> {
    /// Module this writer acts for
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Set one cell
    pub fn set(
        &mut self,
        person: PersonId,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), PopulationError> {
        self.population.write(self.module, person, name, value.into())
    }

    /// Set `name` to `value` on every row
    pub fn fill(&mut self, name: &str, value: impl Into<PropertyValue>) -> Result<(), PopulationError> {
        let value = value.into();
        for row in 0..self.population.len {
            self.population
                .write(self.module, PersonId(row), name, value.clone())?;
        }
        Ok(())
    }

    /// Flip `is_alive` to false
    pub fn mark_dead(&mut self, person: PersonId) -> Result<(), PopulationError> {
        self.population
            .write(self.module, person, IS_ALIVE, PropertyValue::Bool(false))
    }
}

impl<'a> Deref for ColumnWriter<'a> {
    type Target = Population;

    fn deref(&self) -> &Population {
        self.population
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_status() -> Population {
        let mut population = Population::new();
        population
            .declare(
                PropertyDef::new(
                    "mi_status",
                    PropertyType::categorical(&["N", "I", "C"]),
                    "infection status",
                ),
                ModuleId(0),
            )
            .unwrap();
        population.grow(3);
        population
    }

    #[test]
    fn test_new_rows_are_alive_with_defaults() {
        let population = table_with_status();
        assert_eq!(population.len(), 3);
        assert_eq!(population.num_alive(), 3);
        assert_eq!(
            population.get_category(PersonId(2), "mi_status").unwrap(),
            "N"
        );
    }

    #[test]
    fn test_owner_can_write_others_cannot() {
        let mut population = table_with_status();
        population
            .writer(ModuleId(0))
            .set(PersonId(1), "mi_status", "I")
            .unwrap();
        assert_eq!(population.get_category(PersonId(1), "mi_status").unwrap(), "I");

        let err = population
            .writer(ModuleId(1))
            .set(PersonId(1), "mi_status", "C")
            .unwrap_err();
        assert!(matches!(err, PopulationError::NotOwner { .. }));
    }

    #[test]
    fn test_unknown_category_rejected() {
        let mut population = table_with_status();
        let err = population
            .writer(ModuleId(0))
            .set(PersonId(0), "mi_status", "X")
            .unwrap_err();
        assert!(matches!(err, PopulationError::UnknownCategory { .. }));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut population = table_with_status();
        let err = population
            .writer(ModuleId(0))
            .set(PersonId(0), "mi_status", 1.5)
            .unwrap_err();
        assert!(matches!(err, PopulationError::TypeMismatch { .. }));
    }

    #[test]
    fn test_dead_never_becomes_alive() {
        let mut population = table_with_status();
        population
            .grant_shared_write(IS_ALIVE, ModuleId(0))
            .unwrap();
        let mut writer = population.writer(ModuleId(0));
        writer.mark_dead(PersonId(0)).unwrap();
        assert!(!writer.is_alive(PersonId(0)));
        assert_eq!(
            writer.set(PersonId(0), IS_ALIVE, true),
            Err(PopulationError::Resurrection(PersonId(0)))
        );
        assert_eq!(population.num_alive(), 2);
    }

    #[test]
    fn test_unknown_person_is_not_alive() {
        let population = table_with_status();
        assert!(!population.is_alive(PersonId(99)));
        assert_eq!(
            population.get(PersonId(99), IS_ALIVE),
            Err(PopulationError::UnknownPerson(PersonId(99)))
        );
    }

    #[test]
    fn test_declare_after_growth_backfills_defaults() {
        let mut population = table_with_status();
        population
            .declare(PropertyDef::new("mi_date_infected", PropertyType::Date, ""), ModuleId(0))
            .unwrap();
        assert_eq!(population.get_date(PersonId(2), "mi_date_infected").unwrap(), None);
        assert!(population
            .declare(PropertyDef::new("mi_status", PropertyType::Bool, ""), ModuleId(2))
            .is_err());
    }
}
