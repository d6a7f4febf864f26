//! HSI events and the secondary queue they wait in

use crate::models::population::PersonId;
use crate::orchestrator::SimulationError;
use crate::registry::ModuleId;
use crate::Simulation;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// Appointment type -> units demanded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppointmentFootprint(BTreeMap<String, f64>);

impl AppointmentFootprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Footprint with every listed type at zero
    pub fn blank<S: AsRef<str>>(appt_types: &[S]) -> Self {
        Self(
            appt_types
                .iter()
                .map(|t| (t.as_ref().to_string(), 0.0))
                .collect(),
        )
    }

    pub fn with(mut self, appt_type: &str, units: f64) -> Self {
        self.set(appt_type, units);
        self
    }

    pub fn set(&mut self, appt_type: &str, units: f64) {
        self.0.insert(appt_type.to_string(), units);
    }

    pub fn get(&self, appt_type: &str) -> f64 {
        self.0.get(appt_type).copied().unwrap_or(0.0)
    }

    /// Every entry multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        Self(self.0.iter().map(|(k, v)| (k.clone(), v * factor)).collect())
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_zero(&self) -> bool {
        self.0.values().all(|v| *v == 0.0)
    }
}

/// Static description of an HSI event
#[derive(Debug, Clone, PartialEq)]
pub struct HsiInfo {
    pub module: ModuleId,
    pub person_id: PersonId,
    /// Dotted/underscored identifier used for policy matching and logging
    pub treatment_id: String,
    pub footprint: AppointmentFootprint,
    pub facility_level: u8,
    /// Modules to notify after the event runs
    pub alert_other_diseases: Vec<String>,
}

impl HsiInfo {
    pub fn new(module: ModuleId, person_id: PersonId, treatment_id: &str) -> Self {
        Self {
            module,
            person_id,
            treatment_id: treatment_id.to_string(),
            footprint: AppointmentFootprint::new(),
            facility_level: 0,
            alert_other_diseases: Vec::new(),
        }
    }

    pub fn with_footprint(mut self, footprint: AppointmentFootprint) -> Self {
        self.footprint = footprint;
        self
    }

    pub fn at_level(mut self, facility_level: u8) -> Self {
        self.facility_level = facility_level;
        self
    }

    pub fn alerting(mut self, modules: &[&str]) -> Self {
        self.alert_other_diseases = modules.iter().map(|m| m.to_string()).collect();
        self
    }
}

/// A requested clinical interaction
///
/// Only the health system runs these: it calls exactly one of `apply` or
/// `did_not_run`, once, on a date inside the admission window.
pub trait HsiEvent {
    fn info(&self) -> &HsiInfo;

    fn apply(
        &mut self,
        person: PersonId,
        squeeze_factor: f64,
        sim: &mut Simulation,
    ) -> Result<(), SimulationError>;

    /// The event was denied or expired
    fn did_not_run(&mut self, _sim: &mut Simulation) -> Result<(), SimulationError> {
        Ok(())
    }
}

/// An HSI event waiting for its window
pub struct QueuedHsi {
    pub event: Box<dyn HsiEvent>,
    pub priority: u32,
    pub topen: NaiveDate,
    pub tclose: Option<NaiveDate>,
    seq: u64,
}

impl QueuedHsi {
    /// Insertion order within the queue
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Dispatch order: priority, then window opening, then insertion
    fn dispatch_key(&self) -> (u32, NaiveDate, u64) {
        (self.priority, self.topen, self.seq)
    }
}

struct ByOpening(QueuedHsi);

impl PartialEq for ByOpening {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ByOpening {}

impl Ord for ByOpening {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: earliest topen on top
        other
            .0
            .topen
            .cmp(&self.0.topen)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

impl PartialOrd for ByOpening {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending HSI events keyed by window opening
#[derive(Default)]
pub struct HsiQueue {
    heap: BinaryHeap<ByOpening>,
    next_seq: u64,
}

impl HsiQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        event: Box<dyn HsiEvent>,
        priority: u32,
        topen: NaiveDate,
        tclose: Option<NaiveDate>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ByOpening(QueuedHsi {
            event,
            priority,
            topen,
            tclose,
            seq,
        }));
    }

    /// Put back an item taken with [`HsiQueue::take_due`], keeping its place
    pub fn requeue(&mut self, item: QueuedHsi) {
        self.heap.push(ByOpening(item));
    }

    /// Remove every item with `topen <= today`, in dispatch order
    pub fn take_due(&mut self, today: NaiveDate) -> Vec<QueuedHsi> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|top| top.0.topen <= today) {
            if let Some(ByOpening(item)) = self.heap.pop() {
                due.push(item);
            }
        }
        due.sort_by_key(QueuedHsi::dispatch_key);
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(HsiInfo);

    impl HsiEvent for Stub {
        fn info(&self) -> &HsiInfo {
            &self.0
        }

        fn apply(&mut self, _: PersonId, _: f64, _: &mut Simulation) -> Result<(), SimulationError> {
            Ok(())
        }
    }

    fn stub(treatment_id: &str) -> Box<dyn HsiEvent> {
        Box::new(Stub(HsiInfo::new(ModuleId(0), PersonId(0), treatment_id)))
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2010, 1, d).unwrap()
    }

    #[test]
    fn test_take_due_orders_by_priority_then_topen_then_insertion() {
        let mut queue = HsiQueue::new();
        queue.push(stub("low"), 2, day(1), None);
        queue.push(stub("urgent-late"), 0, day(3), None);
        queue.push(stub("urgent-early"), 0, day(2), None);
        queue.push(stub("urgent-early-2"), 0, day(2), None);
        queue.push(stub("future"), 0, day(9), None);

        let due: Vec<String> = queue
            .take_due(day(3))
            .iter()
            .map(|q| q.event.info().treatment_id.clone())
            .collect();
        assert_eq!(
            due,
            vec!["urgent-early", "urgent-early-2", "urgent-late", "low"]
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_requeue_keeps_insertion_rank() {
        let mut queue = HsiQueue::new();
        queue.push(stub("first"), 1, day(1), None);
        queue.push(stub("second"), 1, day(1), None);
        let mut due = queue.take_due(day(1));
        let first = due.remove(0);
        queue.requeue(due.remove(0));
        queue.requeue(first);
        let again: Vec<String> = queue
            .take_due(day(2))
            .iter()
            .map(|q| q.event.info().treatment_id.clone())
            .collect();
        assert_eq!(again, vec!["first", "second"]);
    }

    #[test]
    fn test_footprint_helpers() {
        let blank = AppointmentFootprint::blank(&["Over5OPD", "Under5OPD"]);
        assert!(blank.is_zero());
        let fp = blank.with("Over5OPD", 1.0);
        assert_eq!(fp.get("Over5OPD"), 1.0);
        assert_eq!(fp.get("IPAdmission"), 0.0);
        assert_eq!(fp.scaled(0.25).get("Over5OPD"), 0.25);
        assert_eq!(fp.total(), 1.0);
    }
}
