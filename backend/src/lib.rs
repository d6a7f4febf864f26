//! Health Simulator Core - Rust Engine
//!
//! Discrete-event simulation kernel for individual-based population health
//! models, with a health-system scheduler for treatment appointments.
//!
//! # Architecture
//!
//! - **core**: Simulated calendar and shared helpers
//! - **models**: Entity table, property definitions, structured log records
//! - **registry**: Module contract and module registry
//! - **events**: Event types and the primary event queue
//! - **orchestrator**: Simulation lifecycle and main loop
//! - **healthsystem**: HSI events, secondary queue and daily admission pass
//! - **policy**: Service availability rules and capacity models
//! - **methods**: Reference demography and disease modules
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Simulated time never moves backwards
//! 2. All randomness is deterministic (one seeded RNG per simulation)
//! 3. A column is written only by its owning module (or a declared sharer)

// Module declarations
pub mod core;
pub mod events;
pub mod healthsystem;
pub mod methods;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod registry;
pub mod rng;

// Re-exports for convenience
pub use core::time::{Frequency, SimClock};
pub use events::{Event, EventId, EventPriority, SchedulingError};
pub use healthsystem::{
    AppointmentConstraints, AppointmentFootprint, HealthSystem, HealthSystemConfig,
    HealthSystemError, HsiEvent, HsiInfo,
};
pub use models::{
    event::{EventLog, JsonLinesSink, LogRecord, LogSink},
    population::{PersonId, Population, PopulationError},
};
pub use orchestrator::{RunSummary, Simulation, SimulationConfig, SimulationError};
pub use policy::ServiceAvailability;
pub use registry::{DalyReport, Module, ModuleId, PopulationContext, RegistrationError};
pub use rng::RngManager;
