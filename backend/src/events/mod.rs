//! Events and the primary queue that orders them

pub mod queue;
pub mod types;

pub use queue::{EventQueue, ScheduledEvent, SchedulingError};
pub use types::{Event, EventId, EventPriority, EventScope, IndividualEvent, PopulationEvent};
