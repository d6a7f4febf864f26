//! Module contract and registry
//!
//! A module is a pluggable component that contributes property columns and
//! parameters, and takes part in the simulation through lifecycle hooks.
//! Modules are registered once, in order; that order is the order every hook
//! fires in.
//!
//! Lookups are typed: `registry.get::<Mockitis>()` resolves through the
//! module's `TypeId`, recorded at registration. Name lookups exist for the
//! places that only hold a name (alert fan-out lists).

use crate::core::AsAny;
use crate::models::population::{ColumnWriter, PersonId, Population};
use crate::models::property::{ParameterDef, PropertyDef};
use crate::orchestrator::SimulationError;
use crate::rng::RngManager;
use crate::Simulation;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Index of a registered module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub usize);

impl ModuleId {
    /// Owner of the built-in columns
    pub const KERNEL: ModuleId = ModuleId(usize::MAX);
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == ModuleId::KERNEL {
            write!(f, "kernel")
        } else {
            write!(f, "module #{}", self.0)
        }
    }
}

/// Setup-time registration failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistrationError {
    #[error("module '{0}' is already registered")]
    DuplicateModule(String),

    #[error("property '{property}' of module '{module}' is already declared by '{existing}'")]
    DuplicateProperty {
        property: String,
        module: String,
        existing: String,
    },

    #[error("parameter '{parameter}' of module '{module}' is already declared by '{existing}'")]
    DuplicateParameter {
        parameter: String,
        module: String,
        existing: String,
    },

    #[error("property '{property}' of module '{module}' has an invalid type: {reason}")]
    InvalidPropertyType {
        property: String,
        module: String,
        reason: String,
    },

    #[error("module '{module}' asks to write '{property}', which no registered module declares")]
    UnknownSharedProperty { module: String, property: String },

    #[error("module '{0}' registered after the population was created")]
    PopulationAlreadyCreated(String),
}

/// Disability weights reported by one module for the alive population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DalyReport {
    /// Cause label, prefixed with the module name when collected
    pub cause: String,
    pub values: Vec<(PersonId, f64)>,
}

/// What a module gets when assigning values to its own columns
pub struct PopulationContext<'a> {
    pub population: ColumnWriter<'a>,
    pub rng: &'a mut RngManager,
    pub date: NaiveDate,
}

/// A pluggable simulation component
///
/// Every hook has a no-op default, so a module only implements what it uses.
pub trait Module: AsAny {
    /// Unique module name
    fn name(&self) -> &str;

    fn parameters(&self) -> Vec<ParameterDef> {
        Vec::new()
    }

    fn properties(&self) -> Vec<PropertyDef> {
        Vec::new()
    }

    /// Columns owned by another module that this module also writes
    fn shared_properties(&self) -> &[&'static str] {
        &[]
    }

    fn read_parameters(&mut self, _data_folder: &Path) -> Result<(), SimulationError> {
        Ok(())
    }

    /// Assign initial values to this module's columns on every row
    fn initialise_population(&mut self, _ctx: &mut PopulationContext<'_>) -> Result<(), SimulationError> {
        Ok(())
    }

    /// Put this module's first events on the queue
    fn initialise_simulation(&mut self, _sim: &mut Simulation) -> Result<(), SimulationError> {
        Ok(())
    }

    /// Initialise the child's values for this module's columns
    fn on_birth(
        &mut self,
        _mother: PersonId,
        _child: PersonId,
        _ctx: &mut PopulationContext<'_>,
    ) -> Result<(), SimulationError> {
        Ok(())
    }

    /// Another module's HSI event ran for `person` and named this module
    fn on_hsi_alert(
        &mut self,
        _person: PersonId,
        _treatment_id: &str,
        _sim: &mut Simulation,
    ) -> Result<(), SimulationError> {
        Ok(())
    }

    fn report_daly_values(&self, _population: &Population) -> Option<DalyReport> {
        None
    }
}

struct ModuleSlot {
    name: String,
    /// Empty while the module is checked out to run a hook
    module: Option<Box<dyn Module>>,
}

/// Ordered set of registered modules
#[derive(Default)]
pub struct ModuleRegistry {
    slots: Vec<ModuleSlot>,
    by_name: HashMap<String, ModuleId>,
    by_type: HashMap<TypeId, ModuleId>,
    parameters: HashMap<String, ModuleId>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module after checking its name and parameters
    ///
    /// Property collisions are checked by the caller against the entity table.
    pub fn insert(&mut self, module: Box<dyn Module>) -> Result<ModuleId, RegistrationError> {
        let name = module.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(RegistrationError::DuplicateModule(name));
        }
        let params = module.parameters();
        for param in &params {
            if let Some(&existing) = self.parameters.get(&param.name) {
                return Err(RegistrationError::DuplicateParameter {
                    parameter: param.name.clone(),
                    module: name,
                    existing: self.name(existing).to_string(),
                });
            }
        }

        let id = ModuleId(self.slots.len());
        let type_id = (*module).as_any().type_id();
        for param in params {
            self.parameters.insert(param.name, id);
        }
        self.by_name.insert(name.clone(), id);
        // first registration of a type wins typed lookups
        self.by_type.entry(type_id).or_insert(id);
        self.slots.push(ModuleSlot {
            name,
            module: Some(module),
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Ids in registration order
    pub fn ids(&self) -> Vec<ModuleId> {
        (0..self.slots.len()).map(ModuleId).collect()
    }

    pub fn id_of<M: Module>(&self) -> Option<ModuleId> {
        self.by_type.get(&TypeId::of::<M>()).copied()
    }

    pub fn id_by_name(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    /// Registered name; "kernel" for the kernel id
    pub fn name(&self, id: ModuleId) -> &str {
        match self.slots.get(id.0) {
            Some(slot) => &slot.name,
            None => "kernel",
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.name.as_str()).collect()
    }

    /// Module that declared a parameter
    pub fn parameter_owner(&self, parameter: &str) -> Option<ModuleId> {
        self.parameters.get(parameter).copied()
    }

    /// Typed lookup; `None` if absent or currently checked out
    pub fn get<M: Module>(&self) -> Option<&M> {
        let id = self.id_of::<M>()?;
        self.slots[id.0]
            .module
            .as_deref()
            .and_then(|m| m.as_any().downcast_ref::<M>())
    }

    pub fn get_mut<M: Module>(&mut self) -> Option<&mut M> {
        let id = self.id_of::<M>()?;
        self.slots[id.0]
            .module
            .as_deref_mut()
            .and_then(|m| m.as_any_mut().downcast_mut::<M>())
    }

    pub fn get_dyn(&self, id: ModuleId) -> Option<&dyn Module> {
        self.slots.get(id.0).and_then(|s| s.module.as_deref())
    }

    pub fn get_dyn_mut(&mut self, id: ModuleId) -> Option<&mut (dyn Module + 'static)> {
        self.slots.get_mut(id.0).and_then(|s| s.module.as_deref_mut())
    }

    /// Take a module out of its slot so a hook can borrow the simulation
    pub fn checkout(&mut self, id: ModuleId) -> Option<Box<dyn Module>> {
        self.slots.get_mut(id.0).and_then(|s| s.module.take())
    }

    pub fn restore(&mut self, id: ModuleId, module: Box<dyn Module>) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.module = Some(module);
        }
    }
}
