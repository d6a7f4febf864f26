//! Scheduled work items
//!
//! An [`Event`] is owned by a module and targets either one person or the
//! whole population. Giving it a frequency with [`Event::every`] makes it a
//! regular event: after each firing the kernel re-enqueues it at the next
//! nominal occurrence date.

use crate::core::time::Frequency;
use crate::models::population::PersonId;
use crate::orchestrator::SimulationError;
use crate::registry::ModuleId;
use crate::Simulation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of an event within its day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    StartOfDay,
    FirstHalfOfDay,
    #[default]
    Normal,
    SecondHalfOfDay,
    EndOfDay,
    /// After every `EndOfDay` entry; the health-system scheduler's daily pass
    /// runs here so that appointments booked earlier in the day are seen
    LastOfDay,
}

/// Handle of a scheduled event; shared by every occurrence of a regular event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Work done for a single person
pub trait IndividualEvent {
    fn apply(&mut self, person: PersonId, sim: &mut Simulation) -> Result<(), SimulationError>;
}

impl<F> IndividualEvent for F
where
    F: FnMut(PersonId, &mut Simulation) -> Result<(), SimulationError>,
{
    fn apply(&mut self, person: PersonId, sim: &mut Simulation) -> Result<(), SimulationError> {
        self(person, sim)
    }
}

/// Work done across the whole population
pub trait PopulationEvent {
    fn apply(&mut self, sim: &mut Simulation) -> Result<(), SimulationError>;
}

impl<F> PopulationEvent for F
where
    F: FnMut(&mut Simulation) -> Result<(), SimulationError>,
{
    fn apply(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        self(sim)
    }
}

pub enum EventScope {
    Individual {
        person: PersonId,
        handler: Box<dyn IndividualEvent>,
    },
    Population {
        handler: Box<dyn PopulationEvent>,
    },
}

/// A unit of scheduled work
pub struct Event {
    module: ModuleId,
    label: String,
    scope: EventScope,
    frequency: Option<Frequency>,
    priority: EventPriority,
}

impl Event {
    /// Event targeting one person; skipped if that person is dead when due
    pub fn individual(
        module: ModuleId,
        label: &str,
        person: PersonId,
        handler: impl IndividualEvent + 'static,
    ) -> Self {
        Self {
            module,
            label: label.to_string(),
            scope: EventScope::Individual {
                person,
                handler: Box::new(handler),
            },
            frequency: None,
            priority: EventPriority::Normal,
        }
    }

    /// Event acting on the whole population
    pub fn population(module: ModuleId, label: &str, handler: impl PopulationEvent + 'static) -> Self {
        Self {
            module,
            label: label.to_string(),
            scope: EventScope::Population {
                handler: Box::new(handler),
            },
            frequency: None,
            priority: EventPriority::Normal,
        }
    }

    /// Make this a regular event firing every `frequency`
    pub fn every(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Target person for individual-scope events
    pub fn target(&self) -> Option<PersonId> {
        match &self.scope {
            EventScope::Individual { person, .. } => Some(*person),
            EventScope::Population { .. } => None,
        }
    }

    pub fn frequency(&self) -> Option<Frequency> {
        self.frequency
    }

    pub fn is_regular(&self) -> bool {
        self.frequency.is_some()
    }

    pub fn priority(&self) -> EventPriority {
        self.priority
    }

    pub(crate) fn scope_mut(&mut self) -> &mut EventScope {
        &mut self.scope
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("module", &self.module)
            .field("label", &self.label)
            .field("target", &self.target())
            .field("frequency", &self.frequency)
            .field("priority", &self.priority)
            .finish()
    }
}
