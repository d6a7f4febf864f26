//! ChronicSyndrome: a lifelong condition managed opportunistically
//!
//! It has no care pathway of its own. When another module's appointment
//! alerts it about someone with the syndrome, it books a short follow-up
//! appointment for the same day.

use crate::core::time::Frequency;
use crate::events::{Event, PopulationEvent};
use crate::healthsystem::{HsiEvent, HsiInfo};
use crate::methods::check_probability;
use crate::models::population::{PersonId, Population};
use crate::models::property::{ParameterDef, ParameterType, PropertyDef, PropertyType};
use crate::orchestrator::SimulationError;
use crate::registry::{DalyReport, Module, ModuleId, PopulationContext};
use crate::Simulation;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const CS_HAS_CS: &str = "cs_has_cs";
pub const CS_DATE_ONSET: &str = "cs_date_onset";
pub const CS_PIGGYBACK_COUNT: &str = "cs_piggyback_count";

pub const PIGGYBACK_TREATMENT_ID: &str = "ChronicSyndrome_PiggybackAppt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChronicSyndromeConfig {
    pub initial_prevalence: f64,
    pub monthly_onset_probability: f64,
    pub daly_weight: f64,
    /// Outpatient units of a piggy-back visit
    pub piggyback_units: f64,
}

impl Default for ChronicSyndromeConfig {
    fn default() -> Self {
        Self {
            initial_prevalence: 0.3,
            monthly_onset_probability: 0.005,
            daly_weight: 0.1,
            piggyback_units: 0.25,
        }
    }
}

pub struct ChronicSyndrome {
    config: ChronicSyndromeConfig,
    alerts_received: u64,
}

impl ChronicSyndrome {
    pub fn new(config: ChronicSyndromeConfig) -> Self {
        Self {
            config,
            alerts_received: 0,
        }
    }

    /// Alerts received from other modules' appointments
    pub fn alerts_received(&self) -> u64 {
        self.alerts_received
    }
}

impl Default for ChronicSyndrome {
    fn default() -> Self {
        Self::new(ChronicSyndromeConfig::default())
    }
}

impl Module for ChronicSyndrome {
    fn name(&self) -> &str {
        "ChronicSyndrome"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![
            ParameterDef::new("cs_initial_prevalence", ParameterType::Real, "Prevalence at start"),
            ParameterDef::new("cs_monthly_onset_probability", ParameterType::Real, "Monthly risk of onset"),
            ParameterDef::new("cs_daly_weight", ParameterType::Real, "Disability weight while affected"),
            ParameterDef::new(
                "cs_piggyback_units",
                ParameterType::Real,
                "Over5OPD units of a piggy-back appointment",
            ),
        ]
    }

    fn properties(&self) -> Vec<PropertyDef> {
        vec![
            PropertyDef::new(CS_HAS_CS, PropertyType::Bool, "Has the syndrome"),
            PropertyDef::new(CS_DATE_ONSET, PropertyType::Date, "Date of onset"),
            PropertyDef::new(
                CS_PIGGYBACK_COUNT,
                PropertyType::Int,
                "Follow-up visits attached to other appointments",
            ),
        ]
    }

    fn read_parameters(&mut self, _data_folder: &Path) -> Result<(), SimulationError> {
        check_probability("ChronicSyndrome", "initial_prevalence", self.config.initial_prevalence)?;
        check_probability(
            "ChronicSyndrome",
            "monthly_onset_probability",
            self.config.monthly_onset_probability,
        )
    }

    fn initialise_population(&mut self, ctx: &mut PopulationContext<'_>) -> Result<(), SimulationError> {
        let ids: Vec<PersonId> = ctx.population.ids().collect();
        for person in ids {
            if ctx.rng.bernoulli(self.config.initial_prevalence) {
                ctx.population.set(person, CS_HAS_CS, true)?;
                ctx.population.set(person, CS_DATE_ONSET, ctx.date)?;
            }
        }
        Ok(())
    }

    fn initialise_simulation(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        sim.register_disease_modules(&["ChronicSyndrome"])?;
        let id = sim.module_id::<ChronicSyndrome>()?;
        let poll = OnsetPoll {
            module: id,
            probability: self.config.monthly_onset_probability,
        };
        let event = Event::population(id, "ChronicSyndrome_OnsetPoll", poll).every(Frequency::Months(1));
        sim.schedule_event(event, sim.date())?;
        Ok(())
    }

    fn on_hsi_alert(
        &mut self,
        person: PersonId,
        treatment_id: &str,
        sim: &mut Simulation,
    ) -> Result<(), SimulationError> {
        self.alerts_received += 1;
        if !sim.population().is_alive(person) || !sim.population().get_bool(person, CS_HAS_CS)? {
            return Ok(());
        }

        debug!(%person, from = treatment_id, "booking piggy-back appointment");
        let id = sim.module_id::<ChronicSyndrome>()?;
        let footprint = sim
            .get_blank_appt_footprint()?
            .with("Over5OPD", self.config.piggyback_units);
        let info = HsiInfo::new(id, person, PIGGYBACK_TREATMENT_ID)
            .with_footprint(footprint)
            .at_level(1);
        let today = sim.date();
        sim.schedule_hsi_event(PiggybackAppointment { info }, 0, today, None)
    }

    fn report_daly_values(&self, population: &Population) -> Option<DalyReport> {
        let values = population
            .alive_ids()
            .into_iter()
            .map(|person| {
                let affected = population.get_bool(person, CS_HAS_CS).unwrap_or(false);
                (person, if affected { self.config.daly_weight } else { 0.0 })
            })
            .collect();
        Some(DalyReport {
            cause: "syndrome".to_string(),
            values,
        })
    }
}

struct OnsetPoll {
    module: ModuleId,
    probability: f64,
}

impl PopulationEvent for OnsetPoll {
    fn apply(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        let today = sim.date();
        for person in sim.population().alive_ids() {
            if sim.population().get_bool(person, CS_HAS_CS)? {
                continue;
            }
            if sim.rng().bernoulli(self.probability) {
                let mut columns = sim.columns(self.module);
                columns.set(person, CS_HAS_CS, true)?;
                columns.set(person, CS_DATE_ONSET, today)?;
            }
        }
        Ok(())
    }
}

/// Same-day follow-up booked from another module's appointment
pub struct PiggybackAppointment {
    info: HsiInfo,
}

impl HsiEvent for PiggybackAppointment {
    fn info(&self) -> &HsiInfo {
        &self.info
    }

    fn apply(
        &mut self,
        person: PersonId,
        _squeeze_factor: f64,
        sim: &mut Simulation,
    ) -> Result<(), SimulationError> {
        let visits = sim.population().get_int(person, CS_PIGGYBACK_COUNT)?;
        sim.columns(self.info.module)
            .set(person, CS_PIGGYBACK_COUNT, visits + 1)?;
        Ok(())
    }
}
