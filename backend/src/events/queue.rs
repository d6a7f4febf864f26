//! Primary event queue
//!
//! Min-heap over `(date, priority, insertion sequence)`. Every occurrence of a
//! regular event is a fresh entry that keeps the series' [`EventId`]; the next
//! entry is due one frequency step after the previous entry's nominal date.

use crate::events::types::{Event, EventId, EventPriority};
use crate::registry::ModuleId;
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use thiserror::Error;

/// Errors raised when putting work on a queue
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulingError {
    #[error("cannot schedule '{label}' on {date}: the current date is {today}")]
    InPast {
        label: String,
        date: NaiveDate,
        today: NaiveDate,
    },

    #[error("admission window closes on {tclose}, before it opens on {topen}")]
    InvalidWindow { topen: NaiveDate, tclose: NaiveDate },

    #[error("regular event '{0}' has a zero frequency")]
    ZeroFrequency(String),

    #[error("no scheduled event with id {0}")]
    UnknownEvent(EventId),

    #[error("event {id} belongs to {owner}, not {caller}")]
    NotEventOwner {
        id: EventId,
        owner: ModuleId,
        caller: ModuleId,
    },
}

/// One queue entry, as handed back to the dispatcher
#[derive(Debug)]
pub struct ScheduledEvent {
    pub id: EventId,
    /// Nominal date this entry is due on
    pub date: NaiveDate,
    pub event: Event,
}

struct QueueEntry {
    seq: u64,
    priority: EventPriority,
    scheduled: ScheduledEvent,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the earliest entry first
        other
            .scheduled
            .date
            .cmp(&self.scheduled.date)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
    next_id: u64,
    owners: HashMap<EventId, ModuleId>,
    inactive: HashSet<EventId>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a new event (or the first occurrence of a new series)
    pub fn push_new(&mut self, event: Event, date: NaiveDate) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.owners.insert(id, event.module());
        self.push(ScheduledEvent { id, date, event });
        id
    }

    /// Re-enqueue a series entry for a later occurrence
    pub fn push_occurrence(&mut self, scheduled: ScheduledEvent) {
        self.push(scheduled);
    }

    fn push(&mut self, scheduled: ScheduledEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueEntry {
            seq,
            priority: scheduled.event.priority(),
            scheduled,
        });
    }

    /// Date of the earliest entry
    pub fn peek_date(&self) -> Option<NaiveDate> {
        self.heap.peek().map(|e| e.scheduled.date)
    }

    /// Pop the next entry due on or before `today`
    pub fn pop_due(&mut self, today: NaiveDate) -> Option<ScheduledEvent> {
        if self.peek_date()? > today {
            return None;
        }
        self.heap.pop().map(|e| e.scheduled)
    }

    /// Flag a series so its next firing is skipped and not re-enqueued
    pub fn deactivate(&mut self, caller: ModuleId, id: EventId) -> Result<(), SchedulingError> {
        match self.owners.get(&id) {
            None => Err(SchedulingError::UnknownEvent(id)),
            Some(&owner) if owner != caller => Err(SchedulingError::NotEventOwner { id, owner, caller }),
            Some(_) => {
                self.inactive.insert(id);
                Ok(())
            }
        }
    }

    pub fn is_inactive(&self, id: EventId) -> bool {
        self.inactive.contains(&id)
    }

    /// Forget a finished event or series
    pub fn retire(&mut self, id: EventId) {
        self.owners.remove(&id);
        self.inactive.remove(&id);
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
    use crate::orchestrator::SimulationError;
    use crate::Simulation;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn noop(label: &str, priority: EventPriority) -> Event {
        Event::population(
            ModuleId(0),
            label,
            |_sim: &mut Simulation| -> Result<(), SimulationError> { Ok(()) },
        )
        .with_priority(priority)
    }

    #[test]
    fn test_pops_by_date_then_priority_then_insertion() {
        let mut queue = EventQueue::new();
        let day1 = ymd(2010, 1, 1);
        let day2 = ymd(2010, 1, 2);
        queue.push_new(noop("late", EventPriority::Normal), day2);
        queue.push_new(noop("normal-a", EventPriority::Normal), day1);
        queue.push_new(noop("end", EventPriority::EndOfDay), day1);
        queue.push_new(noop("start", EventPriority::StartOfDay), day1);
        queue.push_new(noop("normal-b", EventPriority::Normal), day1);

        let mut order = Vec::new();
        while let Some(entry) = queue.pop_due(day1) {
            order.push(entry.event.label().to_string());
        }
        assert_eq!(order, vec!["start", "normal-a", "normal-b", "end"]);
        assert_eq!(queue.peek_date(), Some(day2));
        assert!(queue.pop_due(day1).is_none());
    }

    #[test]
    fn test_deactivate_checks_owner() {
        let mut queue = EventQueue::new();
        let id = queue.push_new(noop("poll", EventPriority::Normal), ymd(2010, 1, 1));
        assert_eq!(
            queue.deactivate(ModuleId(1), id),
            Err(SchedulingError::NotEventOwner {
                id,
                owner: ModuleId(0),
                caller: ModuleId(1),
            })
        );
        assert!(queue.deactivate(ModuleId(0), id).is_ok());
        assert!(queue.is_inactive(id));
        queue.retire(id);
        assert_eq!(
            queue.deactivate(ModuleId(0), id),
            Err(SchedulingError::UnknownEvent(id))
        );
    }
}
