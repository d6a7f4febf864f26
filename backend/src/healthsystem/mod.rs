//! Health-system scheduler
//!
//! The health system is a registered module that owns a secondary queue of
//! HSI events. Modules never put HSI events on the primary queue; they call
//! [`Simulation::schedule_hsi_event`], and a daily regular event, the last
//! entry of each day, drains every due entry:
//!
//! 1. dead target: dropped, no callback
//! 2. treatment id denied by the service-availability policy: `did_not_run`
//! 3. past `tclose`: `did_not_run`
//! 4. otherwise the capacity model gives a squeeze factor and `apply` runs,
//!    followed by the alert fan-out to `ALERT_OTHER_DISEASES`
//!
//! Events scheduled during the pass that are already due (piggy-back
//! appointments booked from an alert, say) are picked up by the same pass.
//! In strict mode an event that would be squeezed stays queued for a later
//! day instead of running.

pub mod consumables;
pub mod hsi;

pub use consumables::{
    AllConsumablesAvailable, ConsumableAvailability, ConsumableCode, ConsumableFootprint,
    ConsumableResponse, ProbabilisticAvailability,
};
pub use hsi::{AppointmentFootprint, HsiEvent, HsiInfo, HsiQueue, QueuedHsi};

use crate::core::time::Frequency;
use crate::events::{Event, EventPriority, PopulationEvent, SchedulingError};
use crate::models::event::LogRecord;
use crate::models::population::PersonId;
use crate::models::property::{ParameterDef, ParameterType, PropertyDef, PropertyType};
use crate::orchestrator::SimulationError;
use crate::policy::{CapacityModel, CapacityRequest, ServiceAvailability, UnconstrainedCapacity};
use crate::registry::{Module, PopulationContext};
use crate::Simulation;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Property holding each person's distance to the nearest facility
pub const DISTANCE_TO_NEAREST_FACILITY: &str = "distance_to_nearest_facility";

/// Appointment types known when no list is configured
pub const DEFAULT_APPOINTMENT_TYPES: [&str; 7] = [
    "AccidentsandEmerg",
    "ConWithDCSA",
    "IPAdmission",
    "InpatientDays",
    "LabTBMicro",
    "Over5OPD",
    "Under5OPD",
];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HealthSystemError {
    #[error("a module named '{0}' has already been registered with the health system")]
    DuplicateRegistration(String),

    #[error("'{treatment_id}' alerts '{module}', which has not registered with the health system")]
    NotSubscribed { treatment_id: String, module: String },

    #[error("footprint of '{treatment_id}' uses unknown appointment type '{appt_type}'")]
    UnknownAppointmentType {
        treatment_id: String,
        appt_type: String,
    },

    #[error("footprint of '{treatment_id}' has invalid units {units} for '{appt_type}'")]
    InvalidFootprint {
        treatment_id: String,
        appt_type: String,
        units: f64,
    },

    #[error("mode_appt_constraints must be 0, 1 or 2, got {0}")]
    InvalidConstraintMode(u8),
}

/// How capacity constrains admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AppointmentConstraints {
    /// Squeeze factor forced to zero
    Unconstrained,
    /// Every due event runs, with whatever squeeze applies
    #[default]
    Squeezed,
    /// Squeezed events wait for a later day
    Strict,
}

impl TryFrom<u8> for AppointmentConstraints {
    type Error = HealthSystemError;

    fn try_from(mode: u8) -> Result<Self, Self::Error> {
        match mode {
            0 => Ok(AppointmentConstraints::Unconstrained),
            1 => Ok(AppointmentConstraints::Squeezed),
            2 => Ok(AppointmentConstraints::Strict),
            other => Err(HealthSystemError::InvalidConstraintMode(other)),
        }
    }
}

impl From<AppointmentConstraints> for u8 {
    fn from(mode: AppointmentConstraints) -> u8 {
        match mode {
            AppointmentConstraints::Unconstrained => 0,
            AppointmentConstraints::Squeezed => 1,
            AppointmentConstraints::Strict => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSystemConfig {
    pub service_availability: ServiceAvailability,
    pub mode_appt_constraints: AppointmentConstraints,
    pub capabilities_coefficient: f64,
    pub appointment_types: Vec<String>,
}

impl Default for HealthSystemConfig {
    fn default() -> Self {
        Self {
            service_availability: ServiceAvailability::allow_all(),
            mode_appt_constraints: AppointmentConstraints::default(),
            capabilities_coefficient: 1.0,
            appointment_types: DEFAULT_APPOINTMENT_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

/// Counters for one daily pass
#[derive(Debug, Clone, Default, PartialEq)]
struct PassStats {
    admitted: usize,
    policy_denied: usize,
    expired: usize,
    deferred: usize,
    not_alive: usize,
    appt_units: BTreeMap<String, f64>,
}

/// The health-system module
pub struct HealthSystem {
    config: HealthSystemConfig,
    queue: HsiQueue,
    capacity: Box<dyn CapacityModel>,
    consumables: Box<dyn ConsumableAvailability>,
    disease_modules: Vec<String>,
    hsi_event_queue_counter: u64,
}

impl HealthSystem {
    pub fn new(config: HealthSystemConfig) -> Self {
        Self {
            config,
            queue: HsiQueue::new(),
            capacity: Box::new(UnconstrainedCapacity),
            consumables: Box::new(AllConsumablesAvailable),
            disease_modules: Vec::new(),
            hsi_event_queue_counter: 0,
        }
    }

    pub fn with_capacity_model(mut self, capacity: impl CapacityModel + 'static) -> Self {
        self.capacity = Box::new(capacity);
        self
    }

    pub fn with_consumables(mut self, oracle: impl ConsumableAvailability + 'static) -> Self {
        self.consumables = Box::new(oracle);
        self
    }

    pub fn config(&self) -> &HealthSystemConfig {
        &self.config
    }

    /// HSI events ever accepted into the queue
    pub fn hsi_event_queue_counter(&self) -> u64 {
        self.hsi_event_queue_counter
    }

    /// HSI events currently waiting
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Modules subscribed for alerts, in registration order
    pub fn disease_modules(&self) -> &[String] {
        &self.disease_modules
    }

    pub fn get_blank_appt_footprint(&self) -> AppointmentFootprint {
        AppointmentFootprint::blank(&self.config.appointment_types)
    }

    fn validate_footprint(&self, info: &HsiInfo) -> Result<(), HealthSystemError> {
        for (appt_type, units) in info.footprint.iter() {
            if !self.config.appointment_types.iter().any(|t| t == appt_type) {
                return Err(HealthSystemError::UnknownAppointmentType {
                    treatment_id: info.treatment_id.clone(),
                    appt_type: appt_type.to_string(),
                });
            }
            if !units.is_finite() || units < 0.0 {
                return Err(HealthSystemError::InvalidFootprint {
                    treatment_id: info.treatment_id.clone(),
                    appt_type: appt_type.to_string(),
                    units,
                });
            }
        }
        Ok(())
    }
}

impl Module for HealthSystem {
    fn name(&self) -> &str {
        "HealthSystem"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![
            ParameterDef::new(
                "service_availability",
                ParameterType::Table,
                "Ordered (treatment-id pattern, allowed) rules",
            ),
            ParameterDef::new(
                "capabilities_coefficient",
                ParameterType::Real,
                "Multiplier on the nominal capacity of the system",
            ),
        ]
    }

    fn properties(&self) -> Vec<PropertyDef> {
        vec![PropertyDef::new(
            DISTANCE_TO_NEAREST_FACILITY,
            PropertyType::Real,
            "Distance to the nearest health facility (of any type)",
        )]
    }

    fn read_parameters(&mut self, _data_folder: &Path) -> Result<(), SimulationError> {
        let coefficient = self.config.capabilities_coefficient;
        if !coefficient.is_finite() || coefficient < 0.0 {
            return Err(SimulationError::InvalidParameter {
                module: "HealthSystem".to_string(),
                message: format!("capabilities_coefficient must be >= 0, got {}", coefficient),
            });
        }
        self.capacity.set_capabilities_coefficient(coefficient);
        Ok(())
    }

    fn initialise_population(&mut self, ctx: &mut PopulationContext<'_>) -> Result<(), SimulationError> {
        // Placeholder geography: a standard normal draw, inherited at birth
        let ids: Vec<PersonId> = ctx.population.ids().collect();
        for person in ids {
            let distance = ctx.rng.normal();
            ctx.population
                .set(person, DISTANCE_TO_NEAREST_FACILITY, distance)?;
        }
        Ok(())
    }

    fn initialise_simulation(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        sim.log(LogRecord::ServiceAvailability {
            date: sim.date(),
            rules: self.config.service_availability.rules().to_vec(),
        })?;
        let id = sim.module_id::<HealthSystem>()?;
        let scheduler = Event::population(id, "HealthSystemScheduler", HealthSystemScheduler)
            .every(Frequency::Days(1))
            .with_priority(EventPriority::LastOfDay);
        sim.schedule_event(scheduler, sim.date())?;
        Ok(())
    }

    fn on_birth(
        &mut self,
        mother: PersonId,
        child: PersonId,
        ctx: &mut PopulationContext<'_>,
    ) -> Result<(), SimulationError> {
        let distance = ctx.population.get_real(mother, DISTANCE_TO_NEAREST_FACILITY)?;
        ctx.population
            .set(child, DISTANCE_TO_NEAREST_FACILITY, distance)?;
        Ok(())
    }
}

/// Daily regular event draining the HSI queue
pub struct HealthSystemScheduler;

impl PopulationEvent for HealthSystemScheduler {
    fn apply(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        run_daily_pass(sim)
    }
}

// ============================================================================
// Daily pass
// ============================================================================

fn run_daily_pass(sim: &mut Simulation) -> Result<(), SimulationError> {
    let today = sim.date();
    sim.module_mut::<HealthSystem>()?.capacity.begin_day(today);

    let mut stats = PassStats::default();
    let mut deferred = Vec::new();
    loop {
        let due = sim.module_mut::<HealthSystem>()?.queue.take_due(today);
        if due.is_empty() {
            break;
        }
        for item in due {
            if let Some(waiting) = dispatch(sim, item, today, &mut stats)? {
                deferred.push(waiting);
            }
        }
    }
    stats.deferred = deferred.len();

    let hs = sim.module_mut::<HealthSystem>()?;
    for item in deferred {
        hs.queue.requeue(item);
    }
    let summary = LogRecord::HealthSystemSummary {
        date: today,
        admitted: stats.admitted,
        policy_denied: stats.policy_denied,
        expired: stats.expired,
        deferred: stats.deferred,
        not_alive: stats.not_alive,
        queue_length: hs.queue.len(),
        frac_time_used: hs.capacity.fraction_time_used(),
        appt_units: stats.appt_units,
    };
    sim.log(summary)
}

/// Decide one due item. Returns it back if it has to wait.
fn dispatch(
    sim: &mut Simulation,
    mut item: QueuedHsi,
    today: NaiveDate,
    stats: &mut PassStats,
) -> Result<Option<QueuedHsi>, SimulationError> {
    let info = item.event.info().clone();
    let person = info.person_id;
    let module_name = sim.modules().name(info.module).to_string();

    if !sim.population().is_alive(person) {
        debug!(treatment_id = %info.treatment_id, person = %person, "HSI target not alive, dropped");
        stats.not_alive += 1;
        return Ok(None);
    }

    let hs = sim.module_mut::<HealthSystem>()?;
    if !hs.config.service_availability.is_allowed(&info.treatment_id) {
        stats.policy_denied += 1;
        sim.log(LogRecord::HsiPolicyDenied {
            date: today,
            treatment_id: info.treatment_id.clone(),
            person_id: person,
            module: module_name,
        })?;
        item.event.did_not_run(sim)?;
        return Ok(None);
    }

    if let Some(tclose) = item.tclose {
        if today > tclose {
            stats.expired += 1;
            sim.log(LogRecord::HsiExpired {
                date: today,
                treatment_id: info.treatment_id.clone(),
                person_id: person,
                module: module_name,
                tclose,
            })?;
            item.event.did_not_run(sim)?;
            return Ok(None);
        }
    }

    let request = CapacityRequest {
        treatment_id: &info.treatment_id,
        footprint: &info.footprint,
        facility_level: info.facility_level,
        date: today,
    };
    let hs = sim.module_mut::<HealthSystem>()?;
    let mode = hs.config.mode_appt_constraints;
    let squeeze_factor = match mode {
        AppointmentConstraints::Unconstrained => 0.0,
        _ => {
            let raw = hs.capacity.squeeze_factor(&request);
            if raw.is_nan() {
                warn!(treatment_id = %info.treatment_id, "capacity model returned NaN squeeze factor, using 0");
                0.0
            } else {
                raw.max(0.0)
            }
        }
    };

    if mode == AppointmentConstraints::Strict && squeeze_factor > 0.0 {
        sim.log(LogRecord::HsiDeferred {
            date: today,
            treatment_id: info.treatment_id.clone(),
            person_id: person,
            module: module_name,
            squeeze_factor,
        })?;
        return Ok(Some(item));
    }

    hs.capacity.record_usage(&request);
    stats.admitted += 1;
    for (appt_type, units) in info.footprint.iter() {
        *stats.appt_units.entry(appt_type.to_string()).or_insert(0.0) += units;
    }
    sim.log(LogRecord::HsiAdmitted {
        date: today,
        treatment_id: info.treatment_id.clone(),
        person_id: person,
        module: module_name,
        priority: item.priority,
        facility_level: info.facility_level,
        squeeze_factor,
        footprint: info.footprint.clone(),
    })?;

    item.event.apply(person, squeeze_factor, sim)?;

    for target in &info.alert_other_diseases {
        let id = sim.module_id_by_name(target)?;
        sim.with_module(id, |module, sim| {
            module.on_hsi_alert(person, &info.treatment_id, sim)
        })?;
    }
    Ok(None)
}

// ============================================================================
// Simulation-level health-system API
// ============================================================================

impl Simulation {
    /// Put an HSI event on the health system's queue
    ///
    /// `priority` 0 is the most urgent. `tclose = None` never expires.
    pub fn schedule_hsi_event(
        &mut self,
        event: impl HsiEvent + 'static,
        priority: u32,
        topen: NaiveDate,
        tclose: Option<NaiveDate>,
    ) -> Result<(), SimulationError> {
        let today = self.date();
        let info = event.info();
        if topen < today {
            return Err(SchedulingError::InPast {
                label: info.treatment_id.clone(),
                date: topen,
                today,
            }
            .into());
        }
        if let Some(tclose) = tclose {
            if tclose < topen {
                return Err(SchedulingError::InvalidWindow { topen, tclose }.into());
            }
        }
        for target in &info.alert_other_diseases {
            self.module_id_by_name(target)?;
        }

        let hs = self.module_mut::<HealthSystem>()?;
        hs.validate_footprint(info)?;
        for target in &info.alert_other_diseases {
            if !hs.disease_modules.contains(target) {
                return Err(HealthSystemError::NotSubscribed {
                    treatment_id: info.treatment_id.clone(),
                    module: target.clone(),
                }
                .into());
            }
        }
        debug!(
            treatment_id = %info.treatment_id,
            person = %info.person_id,
            %topen,
            ?tclose,
            priority,
            "HSI event queued"
        );
        hs.queue.push(Box::new(event), priority, topen, tclose);
        hs.hsi_event_queue_counter += 1;
        Ok(())
    }

    /// Fresh zero-valued footprint over the configured appointment types
    pub fn get_blank_appt_footprint(&self) -> Result<AppointmentFootprint, SimulationError> {
        Ok(self.module::<HealthSystem>()?.get_blank_appt_footprint())
    }

    /// Subscribe modules to alert fan-out
    pub fn register_disease_modules(&mut self, names: &[&str]) -> Result<(), SimulationError> {
        for name in names {
            self.module_id_by_name(name)?;
            let hs = self.module_mut::<HealthSystem>()?;
            if hs.disease_modules.iter().any(|m| m == name) {
                return Err(HealthSystemError::DuplicateRegistration(name.to_string()).into());
            }
            hs.disease_modules.push(name.to_string());
            self.log(LogRecord::DiseaseModuleRegistered {
                date: self.date(),
                module: name.to_string(),
            })?;
        }
        Ok(())
    }

    /// Ask the consumables oracle about everything in `footprint`
    ///
    /// The answer is informational; admission has already happened.
    pub fn request_consumables(
        &mut self,
        info: &HsiInfo,
        footprint: &ConsumableFootprint,
    ) -> Result<ConsumableResponse, SimulationError> {
        let (hs, rng) = self.module_and_rng::<HealthSystem>()?;
        let mut response = ConsumableResponse::default();
        for (code, quantity) in footprint.codes() {
            let available = hs
                .consumables
                .is_available(code, quantity, info.facility_level, rng);
            response.insert(code, available);
        }

        let date = self.date();
        self.log(LogRecord::ConsumablesRequested {
            date,
            treatment_id: info.treatment_id.clone(),
            person_id: info.person_id,
            available: response.to_labels(),
        })?;
        let missing = response.unavailable();
        if !missing.is_empty() {
            self.log(LogRecord::ConsumablesUnavailable {
                date,
                treatment_id: info.treatment_id.clone(),
                person_id: info.person_id,
                codes: missing.iter().map(|c| c.to_string()).collect(),
            })?;
        }
        Ok(response)
    }
}
