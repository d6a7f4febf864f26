//! Simulation engine - main loop
//!
//! Owns every piece of run state: clock, entity table, module registry,
//! primary queue, RNG and the record sink. Modules and events get
//! `&mut Simulation` and act through its methods.
//!
//! # Lifecycle
//!
//! ```text
//! register(..)*  ->  create_initial_population(n)  ->  initialise_simulation()  ->  run(end)
//!                                                    \________ simulate(end) ________/
//! ```
//!
//! # Day Loop
//!
//! ```text
//! while today <= end_date and the queue is not empty:
//!     if the next entry is on a later day: jump the clock there
//!     pop and dispatch every entry due today, in (priority, insertion) order
//!     advance the clock one day
//! ```
//!
//! # Critical Invariants
//!
//! - **Determinism**: same seed + same registration order => same run
//! - **No time travel**: nothing is ever scheduled before today
//! - **Dead are inert**: individual events for dead persons never run
//! - **Regular events**: the next occurrence is due on last nominal date + frequency

use crate::core::time::SimClock;
use crate::events::{Event, EventId, EventQueue, EventScope, ScheduledEvent, SchedulingError};
use crate::healthsystem::HealthSystemError;
use crate::models::event::{EventLog, LogRecord, LogSink};
use crate::models::population::{
    invalid_category_set, ColumnWriter, PersonId, Population, PopulationError,
};
use crate::models::property::PropertyType;
use crate::orchestrator::checkpoint::{compute_digest, PopulationSnapshot};
use crate::registry::{Module, ModuleId, ModuleRegistry, PopulationContext, RegistrationError};
use crate::rng::RngManager;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Run-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// First simulated day
    pub start_date: NaiveDate,

    /// RNG seed (for determinism)
    pub seed: u64,

    /// Folder modules read their resource tables from
    #[serde(default)]
    pub data_folder: PathBuf,
}

impl SimulationConfig {
    pub fn new(start_date: NaiveDate, seed: u64) -> Self {
        Self {
            start_date,
            seed,
            data_folder: PathBuf::new(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("registration failed: {0}")]
    Registration(#[from] RegistrationError),

    #[error("scheduling failed: {0}")]
    Scheduling(#[from] SchedulingError),

    #[error("population error: {0}")]
    Population(#[from] PopulationError),

    #[error("health system error: {0}")]
    HealthSystem(#[from] HealthSystemError),

    #[error("missing module dependency: no module '{0}' is registered")]
    MissingModuleDependency(String),

    #[error("module '{0}' is running a hook and cannot be used re-entrantly")]
    ModuleBusy(String),

    #[error("invalid parameter for {module}: {message}")]
    InvalidParameter { module: String, message: String },

    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    #[error("invalid DALY report from {module}: {message}")]
    InvalidDalyReport { module: String, message: String },

    #[error("log sink error: {0}")]
    Log(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of [`Simulation::simulate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub events_processed: u64,
    pub population_size: usize,
    pub alive: usize,
}

// ============================================================================
// Simulation
// ============================================================================

pub struct Simulation {
    config: SimulationConfig,
    clock: SimClock,
    population: Population,
    modules: ModuleRegistry,
    queue: EventQueue,
    rng: RngManager,
    sink: Box<dyn LogSink>,
    sink_open: bool,
    population_created: bool,
    initialised: bool,
    events_processed: u64,
}

impl Simulation {
    /// Create a simulation recording into an in-memory [`EventLog`]
    ///
    /// # Example
    ///
    /// ```rust
    /// use chrono::NaiveDate;
    /// use health_simulator_core_rs::{Simulation, SimulationConfig};
    ///
    /// let start = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
    /// let mut sim = Simulation::new(SimulationConfig::new(start, 42));
    /// sim.create_initial_population(10).unwrap();
    /// let summary = sim.simulate(NaiveDate::from_ymd_opt(2010, 12, 31).unwrap()).unwrap();
    /// assert_eq!(summary.alive, 10);
    /// ```
    pub fn new(config: SimulationConfig) -> Self {
        let clock = SimClock::new(config.start_date);
        let rng = RngManager::new(config.seed);
        Self {
            config,
            clock,
            population: Population::new(),
            modules: ModuleRegistry::new(),
            queue: EventQueue::new(),
            rng,
            sink: Box::new(EventLog::new()),
            sink_open: false,
            population_created: false,
            initialised: false,
            events_processed: 0,
        }
    }

    /// Replace the record sink (before any record is written)
    pub fn with_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self.sink_open = false;
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------------

    /// Append a module to the registry
    ///
    /// Fails if its name, one of its parameters or one of its properties is
    /// already taken, or if the population already exists.
    pub fn register(&mut self, module: impl Module + 'static) -> Result<ModuleId, SimulationError> {
        let name = module.name().to_string();
        if self.population_created {
            return Err(RegistrationError::PopulationAlreadyCreated(name).into());
        }

        let properties = module.properties();
        let mut seen = HashSet::new();
        for property in &properties {
            if let Some(owner) = self.population.owner_of(&property.name) {
                return Err(RegistrationError::DuplicateProperty {
                    property: property.name.clone(),
                    module: name,
                    existing: self.modules.name(owner).to_string(),
                }
                .into());
            }
            if !seen.insert(property.name.as_str()) {
                return Err(RegistrationError::DuplicateProperty {
                    property: property.name.clone(),
                    module: name.clone(),
                    existing: name,
                }
                .into());
            }
            if let PropertyType::Categorical(categories) = &property.kind {
                if let Some(reason) = invalid_category_set(categories) {
                    return Err(RegistrationError::InvalidPropertyType {
                        property: property.name.clone(),
                        module: name,
                        reason,
                    }
                    .into());
                }
            }
        }
        let shared: Vec<&'static str> = module.shared_properties().to_vec();
        for property in &shared {
            let declared_here = properties.iter().any(|p| p.name == *property);
            if !declared_here && !self.population.has_property(property) {
                return Err(RegistrationError::UnknownSharedProperty {
                    module: name,
                    property: property.to_string(),
                }
                .into());
            }
        }

        let id = self.modules.insert(Box::new(module))?;
        for property in properties {
            self.population.declare(property, id)?;
        }
        for property in shared {
            self.population.grant_shared_write(property, id)?;
        }
        info!(module = %name, id = id.0, "registered module");
        Ok(id)
    }

    /// Create `n` persons and let every module initialise its columns
    pub fn create_initial_population(&mut self, n: usize) -> Result<(), SimulationError> {
        if self.population_created {
            return Err(SimulationError::Lifecycle(
                "the initial population has already been created".to_string(),
            ));
        }
        self.population_created = true;
        self.population.grow(n);

        let ids = self.modules.ids();
        for &id in &ids {
            let busy = self.busy_error(id);
            let Simulation {
                modules, config, ..
            } = &mut *self;
            let module = modules.get_dyn_mut(id).ok_or(busy)?;
            module.read_parameters(&config.data_folder)?;
        }
        for &id in &ids {
            let busy = self.busy_error(id);
            let Simulation {
                modules,
                population,
                rng,
                clock,
                ..
            } = &mut *self;
            let module = modules.get_dyn_mut(id).ok_or(busy)?;
            let mut ctx = PopulationContext {
                population: population.writer(id),
                rng,
                date: clock.today(),
            };
            module.initialise_population(&mut ctx)?;
        }
        info!(size = n, modules = ids.len(), "initial population created");
        Ok(())
    }

    /// Let every module schedule its first events
    pub fn initialise_simulation(&mut self) -> Result<(), SimulationError> {
        if self.initialised {
            return Err(SimulationError::Lifecycle(
                "the simulation has already been initialised".to_string(),
            ));
        }
        if !self.population_created {
            return Err(SimulationError::Lifecycle(
                "create the initial population before initialising the simulation".to_string(),
            ));
        }
        self.initialised = true;
        self.log(LogRecord::SimulationStarted {
            date: self.date(),
            population_size: self.population.len(),
            modules: self.modules.names().iter().map(|n| n.to_string()).collect(),
        })?;
        for id in self.modules.ids() {
            self.with_module(id, |module, sim| module.initialise_simulation(sim))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------------

    /// Process every event up to and including `end_date`
    pub fn run(&mut self, end_date: NaiveDate) -> Result<(), SimulationError> {
        if !self.initialised {
            return Err(SimulationError::Lifecycle(
                "initialise the simulation before running it".to_string(),
            ));
        }
        info!(from = %self.date(), to = %end_date, "running simulation");

        while self.clock.today() <= end_date {
            let today = self.clock.today();
            match self.queue.peek_date() {
                None => break,
                Some(next) if next > end_date => break,
                Some(next) if next > today => {
                    // nothing due until `next`
                    self.clock.advance_to(next);
                    continue;
                }
                Some(_) => {}
            }
            while let Some(entry) = self.queue.pop_due(today) {
                self.dispatch(entry)?;
            }
            self.clock.advance_day();
        }
        Ok(())
    }

    /// Initialise (if needed), run to `end_date` and close the record sink
    pub fn simulate(&mut self, end_date: NaiveDate) -> Result<RunSummary, SimulationError> {
        if !self.initialised {
            self.initialise_simulation()?;
        }
        self.run(end_date)?;

        let summary = RunSummary {
            start_date: self.config.start_date,
            end_date,
            events_processed: self.events_processed,
            population_size: self.population.len(),
            alive: self.population.num_alive(),
        };
        self.log(LogRecord::SimulationEnded {
            date: end_date,
            events_processed: summary.events_processed,
            population_size: summary.population_size,
            alive: summary.alive,
        })?;
        self.close_sink()?;
        info!(
            events = summary.events_processed,
            alive = summary.alive,
            size = summary.population_size,
            "simulation finished"
        );
        Ok(summary)
    }

    fn dispatch(&mut self, entry: ScheduledEvent) -> Result<(), SimulationError> {
        let ScheduledEvent { id, date, mut event } = entry;

        if self.queue.is_inactive(id) {
            debug!(event = event.label(), %date, "skipping deactivated event");
            self.queue.retire(id);
            return Ok(());
        }
        if let Some(person) = event.target() {
            if !self.population.is_alive(person) {
                trace!(event = event.label(), person = %person, "target not alive");
                self.queue.retire(id);
                return Ok(());
            }
        }

        match event.scope_mut() {
            EventScope::Individual { person, handler } => handler.apply(*person, self)?,
            EventScope::Population { handler } => handler.apply(self)?,
        }
        self.events_processed += 1;

        let Some(frequency) = event.frequency() else {
            self.queue.retire(id);
            return Ok(());
        };
        if self.queue.is_inactive(id) {
            self.queue.retire(id);
            return Ok(());
        }
        match frequency.after(date) {
            Some(next) => self.queue.push_occurrence(ScheduledEvent {
                id,
                date: next,
                event,
            }),
            None => {
                warn!(event = event.label(), "next occurrence is out of calendar range, series ends");
                self.queue.retire(id);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Put an event on the primary queue
    pub fn schedule_event(&mut self, event: Event, date: NaiveDate) -> Result<EventId, SimulationError> {
        let today = self.date();
        if date < today {
            return Err(SchedulingError::InPast {
                label: event.label().to_string(),
                date,
                today,
            }
            .into());
        }
        if event.frequency().is_some_and(|f| f.is_zero()) {
            return Err(SchedulingError::ZeroFrequency(event.label().to_string()).into());
        }
        trace!(event = event.label(), %date, "event scheduled");
        Ok(self.queue.push_new(event, date))
    }

    /// Stop a (regular) event; its next firing is skipped and not re-enqueued
    pub fn deactivate_event(&mut self, module: ModuleId, id: EventId) -> Result<(), SimulationError> {
        Ok(self.queue.deactivate(module, id)?)
    }

    /// Entries waiting on the primary queue
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    // ------------------------------------------------------------------------
    // Population
    // ------------------------------------------------------------------------

    /// Add a child of `mother` and run every module's `on_birth`
    pub fn do_birth(&mut self, mother: PersonId) -> Result<PersonId, SimulationError> {
        if mother.0 >= self.population.len() {
            return Err(PopulationError::UnknownPerson(mother).into());
        }
        let child = self.population.grow(1);
        for id in self.modules.ids() {
            let busy = self.busy_error(id);
            let Simulation {
                modules,
                population,
                rng,
                clock,
                ..
            } = &mut *self;
            let module = modules.get_dyn_mut(id).ok_or(busy)?;
            let mut ctx = PopulationContext {
                population: population.writer(id),
                rng,
                date: clock.today(),
            };
            module.on_birth(mother, child, &mut ctx)?;
        }
        self.log(LogRecord::Birth {
            date: self.date(),
            mother_id: mother,
            child_id: child,
        })?;
        Ok(child)
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Write handle for the columns `module` owns
    pub fn columns(&mut self, module: ModuleId) -> ColumnWriter<'_> {
        self.population.writer(module)
    }

    pub fn date(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn start_date(&self) -> NaiveDate {
        self.clock.start_date()
    }

    pub fn rng(&mut self) -> &mut RngManager {
        &mut self.rng
    }

    // ------------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------------

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn module_id<M: Module>(&self) -> Result<ModuleId, SimulationError> {
        self.modules
            .id_of::<M>()
            .ok_or_else(|| SimulationError::MissingModuleDependency(std::any::type_name::<M>().to_string()))
    }

    pub fn module_id_by_name(&self, name: &str) -> Result<ModuleId, SimulationError> {
        self.modules
            .id_by_name(name)
            .ok_or_else(|| SimulationError::MissingModuleDependency(name.to_string()))
    }

    /// Typed module lookup
    pub fn module<M: Module>(&self) -> Result<&M, SimulationError> {
        let id = self.module_id::<M>()?;
        self.modules.get::<M>().ok_or_else(|| self.busy_error(id))
    }

    pub fn module_mut<M: Module>(&mut self) -> Result<&mut M, SimulationError> {
        let id = self.module_id::<M>()?;
        let busy = self.busy_error(id);
        self.modules.get_mut::<M>().ok_or(busy)
    }

    /// A module and the RNG at once
    pub fn module_and_rng<M: Module>(&mut self) -> Result<(&mut M, &mut RngManager), SimulationError> {
        let id = self.module_id::<M>()?;
        let busy = self.busy_error(id);
        let module = self.modules.get_mut::<M>().ok_or(busy)?;
        Ok((module, &mut self.rng))
    }

    /// Run `f` with module `id` checked out of the registry
    ///
    /// While `f` runs, the module cannot be looked up through the simulation.
    pub fn with_module<R>(
        &mut self,
        id: ModuleId,
        f: impl FnOnce(&mut dyn Module, &mut Simulation) -> Result<R, SimulationError>,
    ) -> Result<R, SimulationError> {
        if id.0 >= self.modules.len() {
            return Err(SimulationError::MissingModuleDependency(id.to_string()));
        }
        let busy = self.busy_error(id);
        let mut module = self.modules.checkout(id).ok_or(busy)?;
        let result = f(&mut *module, self);
        self.modules.restore(id, module);
        result
    }

    fn busy_error(&self, id: ModuleId) -> SimulationError {
        SimulationError::ModuleBusy(self.modules.name(id).to_string())
    }

    /// Disability weights from every module, labelled `<Module>_<cause>`
    pub fn collect_daly_values(&self) -> Result<BTreeMap<String, Vec<(PersonId, f64)>>, SimulationError> {
        let mut collected = BTreeMap::new();
        for id in self.modules.ids() {
            let name = self.modules.name(id);
            let module = self.modules.get_dyn(id).ok_or_else(|| self.busy_error(id))?;
            let Some(report) = module.report_daly_values(&self.population) else {
                continue;
            };
            for &(person, weight) in &report.values {
                if !self.population.is_alive(person) {
                    return Err(SimulationError::InvalidDalyReport {
                        module: name.to_string(),
                        message: format!("person {} is not alive", person),
                    });
                }
                if !weight.is_finite() || weight < 0.0 {
                    return Err(SimulationError::InvalidDalyReport {
                        module: name.to_string(),
                        message: format!("weight {} for person {}", weight, person),
                    });
                }
            }
            collected.insert(format!("{}_{}", name, report.cause), report.values);
        }
        Ok(collected)
    }

    /// Events dispatched so far
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    // ------------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------------

    /// Emit a record to the run's sink, opening it on first use
    pub fn log(&mut self, record: LogRecord) -> Result<(), SimulationError> {
        if !self.sink_open {
            self.sink.open()?;
            self.sink_open = true;
        }
        self.sink.record(&record)?;
        Ok(())
    }

    /// Emit a free-form record on behalf of a module
    pub fn log_module_record(
        &mut self,
        module: ModuleId,
        key: &str,
        payload: serde_json::Value,
    ) -> Result<(), SimulationError> {
        let record = LogRecord::Module {
            date: self.date(),
            module: self.modules.name(module).to_string(),
            key: key.to_string(),
            payload,
        };
        self.log(record)
    }

    fn close_sink(&mut self) -> Result<(), SimulationError> {
        if self.sink_open {
            self.sink.close()?;
            self.sink_open = false;
        }
        Ok(())
    }

    /// Typed access to the sink
    pub fn log_sink<S: LogSink>(&self) -> Option<&S> {
        (*self.sink).as_any().downcast_ref::<S>()
    }

    /// The in-memory log, if that is the sink in use
    pub fn event_log(&self) -> Option<&EventLog> {
        self.log_sink::<EventLog>()
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> PopulationSnapshot {
        PopulationSnapshot::capture(
            self.date(),
            self.rng.get_state(),
            &self.population,
            &self.modules,
        )
    }

    /// SHA-256 of the canonical entity-table snapshot
    pub fn state_digest(&self) -> Result<String, SimulationError> {
        compute_digest(&self.snapshot())
    }
}
