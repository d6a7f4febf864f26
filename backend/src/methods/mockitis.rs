//! Mockitis: an acute infection treated through the health system
//!
//! Infected persons seek care the month they are infected. The treatment
//! appointment needs consumable package 1, cures with a fixed probability,
//! and alerts the configured co-morbidity modules so they can piggy-back on
//! the visit. Persons the health system cannot see are simply left infected.

use crate::core::time::Frequency;
use crate::events::{Event, PopulationEvent};
use crate::healthsystem::{ConsumableFootprint, HsiEvent, HsiInfo};
use crate::methods::check_probability;
use crate::models::population::{ColumnWriter, PersonId, Population};
use crate::models::property::{ParameterDef, ParameterType, PropertyDef, PropertyType};
use crate::orchestrator::SimulationError;
use crate::registry::{DalyReport, Module, ModuleId, PopulationContext};
use crate::Simulation;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const MI_IS_INFECTED: &str = "mi_is_infected";
pub const MI_STATUS: &str = "mi_status";
pub const MI_DATE_INFECTED: &str = "mi_date_infected";
pub const MI_DATE_CURE: &str = "mi_date_cure";

/// Treatment id of the outpatient treatment appointment
pub const TREATMENT_ID: &str = "Mockitis_Treatment";

/// Consumable package the treatment draws on
pub const TREATMENT_PACKAGE: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockitisConfig {
    pub initial_prevalence: f64,
    pub monthly_infection_probability: f64,
    pub cure_probability: f64,
    pub daly_weight: f64,
    /// Days an appointment stays admissible after it opens
    pub treatment_window_days: u64,
    /// Wait before a failed treatment is tried again
    pub retry_after_days: u64,
    pub alert_other_diseases: Vec<String>,
}

impl Default for MockitisConfig {
    fn default() -> Self {
        Self {
            initial_prevalence: 0.1,
            monthly_infection_probability: 0.02,
            cure_probability: 0.8,
            daly_weight: 0.2,
            treatment_window_days: 30,
            retry_after_days: 7,
            alert_other_diseases: vec!["ChronicSyndrome".to_string()],
        }
    }
}

pub struct Mockitis {
    config: MockitisConfig,
}

impl Mockitis {
    pub fn new(config: MockitisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MockitisConfig {
        &self.config
    }
}

impl Default for Mockitis {
    fn default() -> Self {
        Self::new(MockitisConfig::default())
    }
}

impl Module for Mockitis {
    fn name(&self) -> &str {
        "Mockitis"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![
            ParameterDef::new("mi_initial_prevalence", ParameterType::Real, "Prevalence at start"),
            ParameterDef::new(
                "mi_monthly_infection_probability",
                ParameterType::Real,
                "Monthly risk of infection for the uninfected",
            ),
            ParameterDef::new("mi_cure_probability", ParameterType::Real, "Probability treatment cures"),
            ParameterDef::new("mi_daly_weight", ParameterType::Real, "Disability weight while infected"),
            ParameterDef::new(
                "mi_alert_other_diseases",
                ParameterType::List,
                "Modules alerted after a treatment appointment",
            ),
        ]
    }

    fn properties(&self) -> Vec<PropertyDef> {
        vec![
            PropertyDef::new(MI_IS_INFECTED, PropertyType::Bool, "Currently infected"),
            PropertyDef::new(
                MI_STATUS,
                PropertyType::categorical(&["N", "I", "C"]),
                "Never infected, infected, or cured",
            ),
            PropertyDef::new(MI_DATE_INFECTED, PropertyType::Date, "Date of latest infection"),
            PropertyDef::new(MI_DATE_CURE, PropertyType::Date, "Date of latest cure"),
        ]
    }

    fn read_parameters(&mut self, _data_folder: &Path) -> Result<(), SimulationError> {
        check_probability("Mockitis", "initial_prevalence", self.config.initial_prevalence)?;
        check_probability(
            "Mockitis",
            "monthly_infection_probability",
            self.config.monthly_infection_probability,
        )?;
        check_probability("Mockitis", "cure_probability", self.config.cure_probability)?;
        if !self.config.daly_weight.is_finite() || self.config.daly_weight < 0.0 {
            return Err(SimulationError::InvalidParameter {
                module: "Mockitis".to_string(),
                message: format!("daly_weight must be >= 0, got {}", self.config.daly_weight),
            });
        }
        Ok(())
    }

    fn initialise_population(&mut self, ctx: &mut PopulationContext<'_>) -> Result<(), SimulationError> {
        let ids: Vec<PersonId> = ctx.population.ids().collect();
        for person in ids {
            if ctx.rng.bernoulli(self.config.initial_prevalence) {
                infect(&mut ctx.population, person, ctx.date)?;
            }
        }
        Ok(())
    }

    fn initialise_simulation(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        sim.register_disease_modules(&["Mockitis"])?;
        let id = sim.module_id::<Mockitis>()?;
        let today = sim.date();

        // Alert targets may subscribe after this hook, so the first
        // appointments are booked from an event rather than from here.
        let initial_care = Event::population(
            id,
            "Mockitis_InitialCareSeeking",
            InitialCareSeeking {
                module: id,
                config: self.config.clone(),
            },
        );
        sim.schedule_event(initial_care, today)?;

        let poll = Event::population(
            id,
            "Mockitis_InfectionPoll",
            InfectionPoll {
                module: id,
                config: self.config.clone(),
            },
        )
        .every(Frequency::Months(1));
        let first_poll = Frequency::Months(1).after(today).unwrap_or(today);
        sim.schedule_event(poll, first_poll)?;
        Ok(())
    }

    fn on_birth(
        &mut self,
        _mother: PersonId,
        child: PersonId,
        ctx: &mut PopulationContext<'_>,
    ) -> Result<(), SimulationError> {
        ctx.population.set(child, MI_IS_INFECTED, false)?;
        ctx.population.set(child, MI_STATUS, "N")?;
        Ok(())
    }

    fn report_daly_values(&self, population: &Population) -> Option<DalyReport> {
        let values = population
            .alive_ids()
            .into_iter()
            .map(|person| {
                let infected = population.get_bool(person, MI_IS_INFECTED).unwrap_or(false);
                (person, if infected { self.config.daly_weight } else { 0.0 })
            })
            .collect();
        Some(DalyReport {
            cause: "infection".to_string(),
            values,
        })
    }
}

fn infect(
    columns: &mut ColumnWriter<'_>,
    person: PersonId,
    date: NaiveDate,
) -> Result<(), SimulationError> {
    columns.set(person, MI_IS_INFECTED, true)?;
    columns.set(person, MI_STATUS, "I")?;
    columns.set(person, MI_DATE_INFECTED, date)?;
    Ok(())
}

/// Book a treatment appointment opening on `topen`
fn book_treatment(
    sim: &mut Simulation,
    module: ModuleId,
    person: PersonId,
    config: &MockitisConfig,
    topen: NaiveDate,
) -> Result<(), SimulationError> {
    let alerts: Vec<&str> = config.alert_other_diseases.iter().map(String::as_str).collect();
    let footprint = sim.get_blank_appt_footprint()?.with("Over5OPD", 1.0);
    let info = HsiInfo::new(module, person, TREATMENT_ID)
        .with_footprint(footprint)
        .at_level(1)
        .alerting(&alerts);
    let tclose = topen.checked_add_days(Days::new(config.treatment_window_days));
    let treatment = MockitisTreatment {
        info,
        config: config.clone(),
    };
    sim.schedule_hsi_event(treatment, 1, topen, tclose)
}

// ============================================================================
// Events
// ============================================================================

/// Persons infected at the start seek care on day one
struct InitialCareSeeking {
    module: ModuleId,
    config: MockitisConfig,
}

impl PopulationEvent for InitialCareSeeking {
    fn apply(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        let today = sim.date();
        for person in sim.population().alive_ids() {
            if sim.population().get_bool(person, MI_IS_INFECTED)? {
                book_treatment(sim, self.module, person, &self.config, today)?;
            }
        }
        Ok(())
    }
}

/// Monthly new infections, each of which seeks care straight away
struct InfectionPoll {
    module: ModuleId,
    config: MockitisConfig,
}

impl PopulationEvent for InfectionPoll {
    fn apply(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        let today = sim.date();
        let mut new_infections = 0usize;
        for person in sim.population().alive_ids() {
            if sim.population().get_bool(person, MI_IS_INFECTED)? {
                continue;
            }
            if sim.rng().bernoulli(self.config.monthly_infection_probability) {
                infect(&mut sim.columns(self.module), person, today)?;
                book_treatment(sim, self.module, person, &self.config, today)?;
                new_infections += 1;
            }
        }

        let population = sim.population();
        let mut infected = 0usize;
        for person in population.alive_ids() {
            if population.get_bool(person, MI_IS_INFECTED)? {
                infected += 1;
            }
        }
        debug!(%today, new_infections, infected, "mockitis poll");
        sim.log_module_record(
            self.module,
            "summary",
            serde_json::json!({
                "new_infections": new_infections,
                "infected": infected,
            }),
        )
    }
}

/// Outpatient treatment appointment
pub struct MockitisTreatment {
    info: HsiInfo,
    config: MockitisConfig,
}

impl HsiEvent for MockitisTreatment {
    fn info(&self) -> &HsiInfo {
        &self.info
    }

    fn apply(
        &mut self,
        person: PersonId,
        squeeze_factor: f64,
        sim: &mut Simulation,
    ) -> Result<(), SimulationError> {
        let module = self.info.module;
        if !sim.population().get_bool(person, MI_IS_INFECTED)? {
            return Ok(());
        }

        let drugs = ConsumableFootprint::new().with_package(TREATMENT_PACKAGE);
        let response = sim.request_consumables(&self.info, &drugs)?;
        let cured = response.all_available() && sim.rng().bernoulli(self.config.cure_probability);

        let today = sim.date();
        if cured {
            let mut columns = sim.columns(module);
            columns.set(person, MI_IS_INFECTED, false)?;
            columns.set(person, MI_STATUS, "C")?;
            columns.set(person, MI_DATE_CURE, today)?;
        } else if let Some(retry) = today.checked_add_days(Days::new(self.config.retry_after_days)) {
            book_treatment(sim, module, person, &self.config, retry)?;
        }

        sim.log_module_record(
            module,
            "treatment",
            serde_json::json!({
                "person_id": person,
                "squeeze_factor": squeeze_factor,
                "consumables_available": response.all_available(),
                "cured": cured,
            }),
        )
    }

    fn did_not_run(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        sim.log_module_record(
            self.info.module,
            "treatment_not_run",
            serde_json::json!({ "person_id": self.info.person_id }),
        )
    }
}
