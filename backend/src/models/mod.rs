//! Domain models: the entity table, property schemas and log records

pub mod event;
pub mod population;
pub mod property;

// Re-exports
pub use event::{EventLog, JsonLinesSink, LogRecord, LogSink};
pub use population::{ColumnWriter, PersonId, Population, PopulationError, IS_ALIVE};
pub use property::{ParameterDef, ParameterType, PropertyDef, PropertyType, PropertyValue};
