//! Shared fixtures for the integration tests
//!
//! Recording modules and HSI events push short strings onto a shared
//! [`Trace`], so a test can assert exactly which hooks ran and in what order.

#![allow(dead_code)]

use chrono::NaiveDate;
use health_simulator_core_rs::healthsystem::ConsumableFootprint;
use health_simulator_core_rs::models::property::{ParameterDef, ParameterType, PropertyDef, PropertyType};
use health_simulator_core_rs::models::IS_ALIVE;
use health_simulator_core_rs::policy::{CapacityModel, CapacityRequest};
use health_simulator_core_rs::{
    HealthSystem, HealthSystemConfig, HsiEvent, HsiInfo, Module, ModuleId, PersonId,
    PopulationContext, Simulation, SimulationConfig, SimulationError,
};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

pub type Trace = Rc<RefCell<Vec<String>>>;

pub fn trace() -> Trace {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn entries(trace: &Trace) -> Vec<String> {
    trace.borrow().clone()
}

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn start() -> NaiveDate {
    ymd(2010, 1, 1)
}

pub fn config(seed: u64) -> SimulationConfig {
    SimulationConfig::new(start(), seed)
}

// ============================================================================
// Recorder module
// ============================================================================

/// Module that records every hook call as `"<name>:<hook>"`
pub struct Recorder {
    name: String,
    properties: Vec<PropertyDef>,
    parameters: Vec<ParameterDef>,
    shared: Vec<&'static str>,
    trace: Trace,
    alert_piggyback: Option<String>,
}

impl Recorder {
    pub fn new(name: &str, trace: &Trace) -> Self {
        Self {
            name: name.to_string(),
            properties: Vec::new(),
            parameters: Vec::new(),
            shared: Vec::new(),
            trace: trace.clone(),
            alert_piggyback: None,
        }
    }

    pub fn with_property(mut self, name: &str, kind: PropertyType) -> Self {
        self.properties.push(PropertyDef::new(name, kind, ""));
        self
    }

    pub fn with_parameter(mut self, name: &str) -> Self {
        self.parameters
            .push(ParameterDef::new(name, ParameterType::Real, ""));
        self
    }

    /// Also allowed to write `is_alive`
    pub fn sharing_is_alive(mut self) -> Self {
        self.shared.push(IS_ALIVE);
        self
    }

    pub fn sharing(mut self, property: &'static str) -> Self {
        self.shared.push(property);
        self
    }

    /// On an HSI alert, book a same-day appointment with this treatment id
    pub fn piggybacking(mut self, treatment_id: &str) -> Self {
        self.alert_piggyback = Some(treatment_id.to_string());
        self
    }

    fn push(&self, entry: String) {
        self.trace.borrow_mut().push(entry);
    }
}

impl Module for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        self.parameters.clone()
    }

    fn properties(&self) -> Vec<PropertyDef> {
        self.properties.clone()
    }

    fn shared_properties(&self) -> &[&'static str] {
        &self.shared
    }

    fn read_parameters(&mut self, _data_folder: &Path) -> Result<(), SimulationError> {
        self.push(format!("{}:read_parameters", self.name));
        Ok(())
    }

    fn initialise_population(&mut self, _ctx: &mut PopulationContext<'_>) -> Result<(), SimulationError> {
        self.push(format!("{}:initialise_population", self.name));
        Ok(())
    }

    fn initialise_simulation(&mut self, _sim: &mut Simulation) -> Result<(), SimulationError> {
        self.push(format!("{}:initialise_simulation", self.name));
        Ok(())
    }

    fn on_birth(
        &mut self,
        mother: PersonId,
        child: PersonId,
        _ctx: &mut PopulationContext<'_>,
    ) -> Result<(), SimulationError> {
        self.push(format!("{}:on_birth:{}:{}", self.name, mother, child));
        Ok(())
    }

    fn on_hsi_alert(
        &mut self,
        person: PersonId,
        treatment_id: &str,
        sim: &mut Simulation,
    ) -> Result<(), SimulationError> {
        self.push(format!("{}:alert:{}", self.name, treatment_id));
        if let Some(piggyback) = &self.alert_piggyback {
            let id = sim.module_id_by_name(&self.name)?;
            let footprint = sim.get_blank_appt_footprint()?.with("Over5OPD", 0.25);
            let info = HsiInfo::new(id, person, piggyback).with_footprint(footprint);
            let today = sim.date();
            sim.schedule_hsi_event(TestHsi::new(info, &self.trace), 0, today, None)?;
        }
        Ok(())
    }
}

// ============================================================================
// HSI events
// ============================================================================

/// HSI event recording `apply:<tid>:<squeeze>:<date>` or `did_not_run:<tid>:<date>`
pub struct TestHsi {
    info: HsiInfo,
    trace: Trace,
    consumables: Option<ConsumableFootprint>,
}

impl TestHsi {
    pub fn new(info: HsiInfo, trace: &Trace) -> Self {
        Self {
            info,
            trace: trace.clone(),
            consumables: None,
        }
    }

    pub fn requesting(mut self, footprint: ConsumableFootprint) -> Self {
        self.consumables = Some(footprint);
        self
    }
}

impl HsiEvent for TestHsi {
    fn info(&self) -> &HsiInfo {
        &self.info
    }

    fn apply(
        &mut self,
        _person: PersonId,
        squeeze_factor: f64,
        sim: &mut Simulation,
    ) -> Result<(), SimulationError> {
        self.trace.borrow_mut().push(format!(
            "apply:{}:{}:{}",
            self.info.treatment_id,
            squeeze_factor,
            sim.date()
        ));
        if let Some(footprint) = &self.consumables {
            let response = sim.request_consumables(&self.info, footprint)?;
            self.trace
                .borrow_mut()
                .push(format!("consumables:{}", response.all_available()));
        }
        Ok(())
    }

    fn did_not_run(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        self.trace
            .borrow_mut()
            .push(format!("did_not_run:{}:{}", self.info.treatment_id, sim.date()));
        Ok(())
    }
}

/// Outpatient HSI for `person` owned by `module`
pub fn outpatient(sim: &Simulation, module: ModuleId, person: PersonId, treatment_id: &str) -> HsiInfo {
    let footprint = sim
        .get_blank_appt_footprint()
        .unwrap()
        .with("Over5OPD", 1.0);
    HsiInfo::new(module, person, treatment_id).with_footprint(footprint)
}

// ============================================================================
// Capacity
// ============================================================================

/// Capacity model returning the same squeeze for every request
pub struct FixedSqueeze(pub f64);

impl CapacityModel for FixedSqueeze {
    fn squeeze_factor(&self, _request: &CapacityRequest<'_>) -> f64 {
        self.0
    }
}

// ============================================================================
// Simulation builders
// ============================================================================

/// Health system plus a `Clinic` recorder that can also kill people
///
/// Returns the started simulation and the clinic's id.
pub fn health_system_sim(
    health_system: HealthSystem,
    population: usize,
    trace: &Trace,
) -> (Simulation, ModuleId) {
    let mut sim = Simulation::new(config(42));
    sim.register(health_system).unwrap();
    let clinic = sim
        .register(Recorder::new("Clinic", trace).sharing_is_alive())
        .unwrap();
    sim.create_initial_population(population).unwrap();
    sim.initialise_simulation().unwrap();
    (sim, clinic)
}

pub fn default_health_system() -> HealthSystem {
    HealthSystem::new(HealthSystemConfig::default())
}

/// Only the `apply:`/`did_not_run:`/`consumables:` entries
pub fn hsi_entries(trace: &Trace) -> Vec<String> {
    entries(trace)
        .into_iter()
        .filter(|e| {
            e.starts_with("apply:") || e.starts_with("did_not_run:") || e.starts_with("consumables:")
        })
        .collect()
}
