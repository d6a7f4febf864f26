//! Demography: ages, sexes, deaths and births
//!
//! Owns `date_of_birth`, `mother_id` and `sex`, and is the one collaborator
//! allowed to write `is_alive`. A monthly poll applies a flat death
//! probability to everyone and a flat birth probability to women of
//! reproductive age.

use crate::core::time::Frequency;
use crate::events::{Event, EventPriority, PopulationEvent};
use crate::methods::check_probability;
use crate::models::population::{PersonId, IS_ALIVE};
use crate::models::property::{ParameterDef, ParameterType, PropertyDef, PropertyType};
use crate::orchestrator::SimulationError;
use crate::registry::{Module, ModuleId, PopulationContext};
use crate::Simulation;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const DATE_OF_BIRTH: &str = "date_of_birth";
pub const MOTHER_ID: &str = "mother_id";
pub const SEX: &str = "sex";

/// `mother_id` of persons in the initial population
pub const NO_MOTHER: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemographyConfig {
    pub monthly_death_probability: f64,
    pub monthly_birth_probability: f64,
    pub max_initial_age_years: u32,
    pub min_maternal_age_years: u32,
    pub max_maternal_age_years: u32,
}

impl Default for DemographyConfig {
    fn default() -> Self {
        Self {
            monthly_death_probability: 0.001,
            monthly_birth_probability: 0.005,
            max_initial_age_years: 80,
            min_maternal_age_years: 15,
            max_maternal_age_years: 49,
        }
    }
}

pub struct Demography {
    config: DemographyConfig,
}

impl Demography {
    pub fn new(config: DemographyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DemographyConfig {
        &self.config
    }
}

impl Default for Demography {
    fn default() -> Self {
        Self::new(DemographyConfig::default())
    }
}

fn draw_sex(ctx: &mut PopulationContext<'_>) -> &'static str {
    if ctx.rng.bernoulli(0.5) {
        "F"
    } else {
        "M"
    }
}

/// Whole years between `dob` and `today`
pub fn age_in_years(dob: NaiveDate, today: NaiveDate) -> i64 {
    today.years_since(dob).map(i64::from).unwrap_or(0)
}

impl Module for Demography {
    fn name(&self) -> &str {
        "Demography"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![
            ParameterDef::new(
                "demog_monthly_death_probability",
                ParameterType::Real,
                "Probability of dying in any month",
            ),
            ParameterDef::new(
                "demog_monthly_birth_probability",
                ParameterType::Real,
                "Probability a woman of reproductive age gives birth in any month",
            ),
            ParameterDef::new(
                "demog_max_initial_age_years",
                ParameterType::Int,
                "Oldest age in the initial population",
            ),
        ]
    }

    fn properties(&self) -> Vec<PropertyDef> {
        vec![
            PropertyDef::new(DATE_OF_BIRTH, PropertyType::Date, "Date of birth"),
            PropertyDef::new(MOTHER_ID, PropertyType::Int, "Row id of the mother, -1 if unknown"),
            PropertyDef::new(SEX, PropertyType::categorical(&["M", "F"]), "Sex"),
        ]
    }

    fn shared_properties(&self) -> &[&'static str] {
        &[IS_ALIVE]
    }

    fn read_parameters(&mut self, _data_folder: &Path) -> Result<(), SimulationError> {
        check_probability(
            "Demography",
            "monthly_death_probability",
            self.config.monthly_death_probability,
        )?;
        check_probability(
            "Demography",
            "monthly_birth_probability",
            self.config.monthly_birth_probability,
        )?;
        if self.config.min_maternal_age_years > self.config.max_maternal_age_years {
            return Err(SimulationError::InvalidParameter {
                module: "Demography".to_string(),
                message: "min_maternal_age_years is above max_maternal_age_years".to_string(),
            });
        }
        Ok(())
    }

    fn initialise_population(&mut self, ctx: &mut PopulationContext<'_>) -> Result<(), SimulationError> {
        let max_age_days = i64::from(self.config.max_initial_age_years.max(1)) * 365;
        let ids: Vec<PersonId> = ctx.population.ids().collect();
        for person in ids {
            let age_days = ctx.rng.range(0, max_age_days) as u64;
            let dob = ctx.date.checked_sub_days(Days::new(age_days)).unwrap_or(ctx.date);
            let sex = draw_sex(ctx);
            ctx.population.set(person, DATE_OF_BIRTH, dob)?;
            ctx.population.set(person, MOTHER_ID, NO_MOTHER)?;
            ctx.population.set(person, SEX, sex)?;
        }
        Ok(())
    }

    fn initialise_simulation(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        let id = sim.module_id::<Demography>()?;
        let poll = DemographyPoll {
            module: id,
            config: self.config.clone(),
        };
        let event = Event::population(id, "Demography_Poll", poll)
            .every(Frequency::Months(1))
            .with_priority(EventPriority::StartOfDay);
        sim.schedule_event(event, sim.date())?;
        Ok(())
    }

    fn on_birth(
        &mut self,
        mother: PersonId,
        child: PersonId,
        ctx: &mut PopulationContext<'_>,
    ) -> Result<(), SimulationError> {
        let sex = draw_sex(ctx);
        let today = ctx.date;
        ctx.population.set(child, DATE_OF_BIRTH, today)?;
        ctx.population.set(child, MOTHER_ID, mother.0 as i64)?;
        ctx.population.set(child, SEX, sex)?;
        Ok(())
    }
}

/// Monthly deaths and births
struct DemographyPoll {
    module: ModuleId,
    config: DemographyConfig,
}

impl PopulationEvent for DemographyPoll {
    fn apply(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        let today = sim.date();
        let mut deaths = 0usize;
        let mut births = 0usize;

        for person in sim.population().alive_ids() {
            if sim.rng().bernoulli(self.config.monthly_death_probability) {
                sim.columns(self.module).mark_dead(person)?;
                deaths += 1;
                continue;
            }

            let population = sim.population();
            if population.get_category(person, SEX)? != "F" {
                continue;
            }
            let age = population
                .get_date(person, DATE_OF_BIRTH)?
                .map(|dob| age_in_years(dob, today))
                .unwrap_or(0);
            let fertile = age >= i64::from(self.config.min_maternal_age_years)
                && age <= i64::from(self.config.max_maternal_age_years);
            if fertile && sim.rng().bernoulli(self.config.monthly_birth_probability) {
                sim.do_birth(person)?;
                births += 1;
            }
        }

        debug!(%today, deaths, births, "demography poll");
        sim.log_module_record(
            self.module,
            "population",
            serde_json::json!({
                "deaths": deaths,
                "births": births,
                "alive": sim.population().num_alive(),
            }),
        )
    }
}
