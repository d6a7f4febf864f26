//! Structured log records for auditing and analysis.
//!
//! Every dispatch decision the kernel and the health system make is emitted
//! as a [`LogRecord`] to the run's [`LogSink`]. Records enable:
//! - Auditing (which interactions ran, were denied, expired or deferred)
//! - Debugging (what happened to a person, and when)
//! - Analysis (daily health-system load, appointment use)
//!
//! # Record Types
//!
//! - **Run**: simulation started / ended, births
//! - **Setup**: service-availability table, disease-module subscriptions
//! - **HSI**: admitted, policy-denied, expired, deferred
//! - **Consumables**: requested, unavailable
//! - **Summary**: one health-system summary per simulated day
//! - **Module**: free-form records emitted by collaborator modules
//!
//! The serialized schema is stable: one JSON object per record, tagged by
//! `event`, always carrying `date`.
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use health_simulator_core_rs::models::event::{EventLog, LogRecord};
//! use health_simulator_core_rs::models::PersonId;
//!
//! let mut log = EventLog::new();
//! log.log(LogRecord::HsiPolicyDenied {
//!     date: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
//!     treatment_id: "Mockitis_Treatment".to_string(),
//!     person_id: PersonId(3),
//!     module: "Mockitis".to_string(),
//! });
//!
//! assert_eq!(log.events_of_type("HsiPolicyDenied").len(), 1);
//! ```

use crate::core::AsAny;
use crate::healthsystem::AppointmentFootprint;
use crate::models::population::PersonId;
use crate::policy::ServiceRule;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};

/// One record of the structured side-channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum LogRecord {
    SimulationStarted {
        date: NaiveDate,
        population_size: usize,
        modules: Vec<String>,
    },

    SimulationEnded {
        date: NaiveDate,
        events_processed: u64,
        population_size: usize,
        alive: usize,
    },

    Birth {
        date: NaiveDate,
        mother_id: PersonId,
        child_id: PersonId,
    },

    /// Service-availability table in force for the run
    ServiceAvailability {
        date: NaiveDate,
        rules: Vec<ServiceRule>,
    },

    DiseaseModuleRegistered {
        date: NaiveDate,
        module: String,
    },

    /// HSI event ran
    HsiAdmitted {
        date: NaiveDate,
        treatment_id: String,
        person_id: PersonId,
        module: String,
        priority: u32,
        facility_level: u8,
        squeeze_factor: f64,
        footprint: AppointmentFootprint,
    },

    /// Treatment id not allowed by the service-availability policy
    HsiPolicyDenied {
        date: NaiveDate,
        treatment_id: String,
        person_id: PersonId,
        module: String,
    },

    /// Admission window closed before the event could run
    HsiExpired {
        date: NaiveDate,
        treatment_id: String,
        person_id: PersonId,
        module: String,
        tclose: NaiveDate,
    },

    /// Left queued because capacity was squeezed
    HsiDeferred {
        date: NaiveDate,
        treatment_id: String,
        person_id: PersonId,
        module: String,
        squeeze_factor: f64,
    },

    ConsumablesRequested {
        date: NaiveDate,
        treatment_id: String,
        person_id: PersonId,
        available: BTreeMap<String, bool>,
    },

    ConsumablesUnavailable {
        date: NaiveDate,
        treatment_id: String,
        person_id: PersonId,
        codes: Vec<String>,
    },

    /// End-of-pass summary of the health-system scheduler
    HealthSystemSummary {
        date: NaiveDate,
        admitted: usize,
        policy_denied: usize,
        expired: usize,
        deferred: usize,
        not_alive: usize,
        queue_length: usize,
        frac_time_used: f64,
        appt_units: BTreeMap<String, f64>,
    },

    /// Free-form record from a collaborator module
    Module {
        date: NaiveDate,
        module: String,
        key: String,
        payload: serde_json::Value,
    },
}

impl LogRecord {
    /// Date the record was emitted on
    pub fn date(&self) -> NaiveDate {
        match self {
            LogRecord::SimulationStarted { date, .. }
            | LogRecord::SimulationEnded { date, .. }
            | LogRecord::Birth { date, .. }
            | LogRecord::ServiceAvailability { date, .. }
            | LogRecord::DiseaseModuleRegistered { date, .. }
            | LogRecord::HsiAdmitted { date, .. }
            | LogRecord::HsiPolicyDenied { date, .. }
            | LogRecord::HsiExpired { date, .. }
            | LogRecord::HsiDeferred { date, .. }
            | LogRecord::ConsumablesRequested { date, .. }
            | LogRecord::ConsumablesUnavailable { date, .. }
            | LogRecord::HealthSystemSummary { date, .. }
            | LogRecord::Module { date, .. } => *date,
        }
    }

    /// Record type name (matches the serialized `event` tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            LogRecord::SimulationStarted { .. } => "SimulationStarted",
            LogRecord::SimulationEnded { .. } => "SimulationEnded",
            LogRecord::Birth { .. } => "Birth",
            LogRecord::ServiceAvailability { .. } => "ServiceAvailability",
            LogRecord::DiseaseModuleRegistered { .. } => "DiseaseModuleRegistered",
            LogRecord::HsiAdmitted { .. } => "HsiAdmitted",
            LogRecord::HsiPolicyDenied { .. } => "HsiPolicyDenied",
            LogRecord::HsiExpired { .. } => "HsiExpired",
            LogRecord::HsiDeferred { .. } => "HsiDeferred",
            LogRecord::ConsumablesRequested { .. } => "ConsumablesRequested",
            LogRecord::ConsumablesUnavailable { .. } => "ConsumablesUnavailable",
            LogRecord::HealthSystemSummary { .. } => "HealthSystemSummary",
            LogRecord::Module { .. } => "Module",
        }
    }

    /// Person the record is about, if any
    pub fn person_id(&self) -> Option<PersonId> {
        match self {
            LogRecord::HsiAdmitted { person_id, .. }
            | LogRecord::HsiPolicyDenied { person_id, .. }
            | LogRecord::HsiExpired { person_id, .. }
            | LogRecord::HsiDeferred { person_id, .. }
            | LogRecord::ConsumablesRequested { person_id, .. }
            | LogRecord::ConsumablesUnavailable { person_id, .. } => Some(*person_id),
            LogRecord::Birth { child_id, .. } => Some(*child_id),
            _ => None,
        }
    }

    /// Treatment id of HSI and consumable records
    pub fn treatment_id(&self) -> Option<&str> {
        match self {
            LogRecord::HsiAdmitted { treatment_id, .. }
            | LogRecord::HsiPolicyDenied { treatment_id, .. }
            | LogRecord::HsiExpired { treatment_id, .. }
            | LogRecord::HsiDeferred { treatment_id, .. }
            | LogRecord::ConsumablesRequested { treatment_id, .. }
            | LogRecord::ConsumablesUnavailable { treatment_id, .. } => Some(treatment_id),
            _ => None,
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Destination of the record stream for one run
///
/// The simulation opens the sink before the first record and closes it when
/// the run ends.
pub trait LogSink: AsAny {
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn record(&mut self, record: &LogRecord) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory record log with query helpers
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<LogRecord>,
}

impl EventLog {
    /// Create a new empty log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Append a record
    pub fn log(&mut self, record: LogRecord) {
        self.events.push(record);
    }

    /// All records in emission order
    pub fn events(&self) -> &[LogRecord] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Records emitted on a specific date
    pub fn events_on(&self, date: NaiveDate) -> Vec<&LogRecord> {
        self.events.iter().filter(|e| e.date() == date).collect()
    }

    /// Records of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&LogRecord> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Records about a specific person
    pub fn events_for_person(&self, person: PersonId) -> Vec<&LogRecord> {
        self.events
            .iter()
            .filter(|e| e.person_id() == Some(person))
            .collect()
    }

    /// Records about a specific treatment id
    pub fn events_for_treatment(&self, treatment_id: &str) -> Vec<&LogRecord> {
        self.events
            .iter()
            .filter(|e| e.treatment_id() == Some(treatment_id))
            .collect()
    }

    /// Payloads of `Module` records with the given module and key
    pub fn module_records(&self, module: &str, key: &str) -> Vec<&serde_json::Value> {
        self.events
            .iter()
            .filter_map(|e| match e {
                LogRecord::Module {
                    module: m,
                    key: k,
                    payload,
                    ..
                } if m == module && k == key => Some(payload),
                _ => None,
            })
            .collect()
    }

    /// Clear all records
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl LogSink for EventLog {
    fn record(&mut self, record: &LogRecord) -> io::Result<()> {
        self.log(record.clone());
        Ok(())
    }
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W: Write + 'static> {
    writer: W,
    written: u64,
}

impl<W: Write + 'static> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Number of records written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + 'static> LogSink for JsonLinesSink<W> {
    fn record(&mut self, record: &LogRecord) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
