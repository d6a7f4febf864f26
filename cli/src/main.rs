// Health Simulator CLI
//
// ```console
// $ cargo run -p health-simulator-cli -- --config cli/scenarios/default.json --output run.jsonl
// ```

mod config;

use clap::Parser;
use config::{CliArgs, CliError, ScenarioConfig};
use health_simulator_core_rs::healthsystem::AllConsumablesAvailable;
use health_simulator_core_rs::methods::{ChronicSyndrome, Demography, Mockitis};
use health_simulator_core_rs::policy::DailyBudgetCapacity;
use health_simulator_core_rs::{HealthSystem, JsonLinesSink, RunSummary, Simulation};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// What the binary prints on success
#[derive(Debug, Serialize)]
struct RunReport {
    #[serde(flatten)]
    summary: RunSummary,
    hsi_event_queue_counter: u64,
    state_digest: String,
}

fn main() {
    let args = CliArgs::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<(), CliError> {
    let scenario = ScenarioConfig::from_args(args)?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&scenario)?);
        return Ok(());
    }

    let mut sim = build_simulation(&scenario, args)?;
    sim.create_initial_population(scenario.population_size)?;
    info!(
        population = scenario.population_size,
        start = %scenario.simulation.start_date,
        end = %scenario.end_date,
        "running scenario"
    );
    let summary = sim.simulate(scenario.end_date)?;

    let report = RunReport {
        summary,
        hsi_event_queue_counter: sim.module::<HealthSystem>()?.hsi_event_queue_counter(),
        state_digest: sim.state_digest()?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn build_simulation(scenario: &ScenarioConfig, args: &CliArgs) -> Result<Simulation, CliError> {
    let mut sim = Simulation::new(scenario.simulation.clone());
    if let Some(path) = &args.output {
        let file = File::create(path).map_err(|source| CliError::Output {
            path: path.clone(),
            source,
        })?;
        sim = sim.with_sink(JsonLinesSink::new(BufWriter::new(file)));
    }

    let mut health_system = HealthSystem::new(scenario.health_system.clone());
    if let Some(units) = scenario.daily_capacity {
        health_system = health_system.with_capacity_model(DailyBudgetCapacity::new(units));
    }
    health_system = match &scenario.consumables {
        Some(table) => health_system.with_consumables(table.clone()),
        None => health_system.with_consumables(AllConsumablesAvailable),
    };

    sim.register(Demography::new(scenario.demography.clone()))?;
    sim.register(health_system)?;
    sim.register(Mockitis::new(scenario.mockitis.clone()))?;
    sim.register(ChronicSyndrome::new(scenario.chronic_syndrome.clone()))?;
    Ok(sim)
}
