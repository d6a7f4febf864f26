//! Command-line arguments and the JSON scenario file

use chrono::NaiveDate;
use clap::Parser;
use health_simulator_core_rs::healthsystem::ProbabilisticAvailability;
use health_simulator_core_rs::methods::{ChronicSyndromeConfig, DemographyConfig, MockitisConfig};
use health_simulator_core_rs::{HealthSystemConfig, SimulationConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read scenario file {path}: {source}")]
    ReadScenario {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid scenario file {path}: {source}")]
    ParseScenario {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to open output file {path}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("end date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },

    #[error(transparent)]
    Simulation(#[from] health_simulator_core_rs::SimulationError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "health-sim",
    version,
    about = "Run a population health scenario and write its record stream",
    long_about = "Builds a simulation with the Demography, HealthSystem, Mockitis and \
ChronicSyndrome modules, runs it to the end date and prints a JSON run summary \
with the final state digest.

EXAMPLES:
    # Default scenario, 50 people, 2010-01-01 to 2015-01-01
    health-sim

    # Interventions off
    health-sim --config scenarios/interventions_off.json

    # Write every record as JSON lines
    health-sim --config scenarios/default.json --output run.jsonl

Log verbosity follows RUST_LOG (default: info)."
)]
pub struct CliArgs {
    /// Scenario file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Last simulated date (inclusive), overrides the scenario
    #[arg(long)]
    pub end_date: Option<NaiveDate>,

    /// Initial population size, overrides the scenario
    #[arg(short, long)]
    pub population: Option<usize>,

    /// RNG seed, overrides the scenario
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write the record stream here as JSON lines
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the resolved scenario as JSON and exit
    #[arg(long)]
    pub print_config: bool,
}

/// Everything needed to build and run one simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub simulation: SimulationConfig,
    pub end_date: NaiveDate,
    pub population_size: usize,
    pub health_system: HealthSystemConfig,
    /// Nominal appointment units per day; absent means unconstrained
    pub daily_capacity: Option<f64>,
    /// Absent means every consumable is always available
    pub consumables: Option<ProbabilisticAvailability>,
    pub demography: DemographyConfig,
    pub mockitis: MockitisConfig,
    pub chronic_syndrome: ChronicSyndromeConfig,
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::new(ymd(2010, 1, 1), 12345),
            end_date: ymd(2015, 1, 1),
            population_size: 50,
            health_system: HealthSystemConfig::default(),
            daily_capacity: None,
            consumables: None,
            demography: DemographyConfig::default(),
            mockitis: MockitisConfig::default(),
            chronic_syndrome: ChronicSyndromeConfig::default(),
        }
    }
}

impl ScenarioConfig {
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let text = fs::read_to_string(path).map_err(|source| CliError::ReadScenario {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CliError::ParseScenario {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the scenario named by `args` (or the default) and apply overrides
    pub fn from_args(args: &CliArgs) -> Result<Self, CliError> {
        let mut scenario = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(end_date) = args.end_date {
            scenario.end_date = end_date;
        }
        if let Some(population) = args.population {
            scenario.population_size = population;
        }
        if let Some(seed) = args.seed {
            scenario.simulation.seed = seed;
        }
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<(), CliError> {
        if self.end_date < self.simulation.start_date {
            return Err(CliError::EndBeforeStart {
                start: self.simulation.start_date,
                end: self.end_date,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_scenario_uses_defaults() {
        let scenario: ScenarioConfig = serde_json::from_str(
            r#"{
                "simulation": {"start_date": "2010-01-01", "seed": 7},
                "health_system": {"service_availability": []},
                "population_size": 20
            }"#,
        )
        .unwrap();
        assert_eq!(scenario.simulation.seed, 7);
        assert_eq!(scenario.population_size, 20);
        assert_eq!(scenario.end_date, ymd(2015, 1, 1));
        assert!(scenario.consumables.is_none());
    }

    #[test]
    fn test_overrides_apply_over_defaults() {
        let args = CliArgs::parse_from([
            "health-sim",
            "--seed",
            "99",
            "--population",
            "10",
            "--end-date",
            "2011-01-01",
        ]);
        let scenario = ScenarioConfig::from_args(&args).unwrap();
        assert_eq!(scenario.simulation.seed, 99);
        assert_eq!(scenario.population_size, 10);
        assert_eq!(scenario.end_date, ymd(2011, 1, 1));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let args = CliArgs::parse_from(["health-sim", "--end-date", "2009-12-31"]);
        assert!(matches!(
            ScenarioConfig::from_args(&args),
            Err(CliError::EndBeforeStart { .. })
        ));
    }
}
