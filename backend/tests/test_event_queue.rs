//! Primary event queue and main loop tests
//!
//! Critical invariants tested:
//! - Dispatch order: date, then priority, then insertion
//! - `run(end)` is inclusive and leaves later events queued
//! - Regular events step from their last nominal date until deactivated
//! - Individual events never fire for dead targets

mod common;

use chrono::NaiveDate;
use common::*;
use proptest::prelude::*;
use health_simulator_core_rs::{
    Event, EventPriority, Frequency, LogRecord, ModuleId, PersonId, SchedulingError, Simulation,
    SimulationError,
};
use std::cell::RefCell;
use std::rc::Rc;

// ============================================================================
// Test Helpers
// ============================================================================

type Fired = Rc<RefCell<Vec<(NaiveDate, String)>>>;

fn fired() -> Fired {
    Rc::new(RefCell::new(Vec::new()))
}

/// Population handler that notes its label and the date it ran on
fn note(
    fired: &Fired,
    label: &str,
) -> impl FnMut(&mut Simulation) -> Result<(), SimulationError> + 'static {
    let fired = fired.clone();
    let label = label.to_string();
    move |sim: &mut Simulation| -> Result<(), SimulationError> {
        fired.borrow_mut().push((sim.date(), label.clone()));
        Ok(())
    }
}

fn labels(fired: &Fired) -> Vec<String> {
    fired.borrow().iter().map(|(_, l)| l.clone()).collect()
}

fn dates(fired: &Fired) -> Vec<NaiveDate> {
    fired.borrow().iter().map(|(d, _)| *d).collect()
}

/// Started simulation with one module allowed to kill people
fn started(population: usize) -> (Simulation, ModuleId) {
    let trace = trace();
    let mut sim = Simulation::new(config(7));
    let id = sim
        .register(Recorder::new("Scheduler", &trace).sharing_is_alive())
        .unwrap();
    sim.create_initial_population(population).unwrap();
    sim.initialise_simulation().unwrap();
    (sim, id)
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_same_day_order_is_priority_then_insertion() {
    let (mut sim, id) = started(1);
    let f = fired();
    let today = sim.date();
    let plan = [
        ("normal_1", EventPriority::Normal),
        ("end", EventPriority::EndOfDay),
        ("start", EventPriority::StartOfDay),
        ("normal_2", EventPriority::Normal),
        ("second_half", EventPriority::SecondHalfOfDay),
    ];
    for (label, priority) in plan {
        sim.schedule_event(Event::population(id, label, note(&f, label)).with_priority(priority), today)
            .unwrap();
    }

    sim.run(today).unwrap();

    assert_eq!(
        labels(&f),
        vec!["start", "normal_1", "normal_2", "second_half", "end"]
    );
}

#[test]
fn test_dates_in_order_and_end_inclusive() {
    let (mut sim, id) = started(1);
    let f = fired();
    for (label, date) in [("c", ymd(2010, 1, 10)), ("b", ymd(2010, 1, 5)), ("a", ymd(2010, 1, 2))] {
        sim.schedule_event(Event::population(id, label, note(&f, label)), date)
            .unwrap();
    }

    sim.run(ymd(2010, 1, 5)).unwrap();
    assert_eq!(labels(&f), vec!["a", "b"]);
    assert_eq!(sim.queue_len(), 1);

    sim.run(ymd(2010, 1, 10)).unwrap();
    assert_eq!(labels(&f), vec!["a", "b", "c"]);
    assert_eq!(dates(&f), vec![ymd(2010, 1, 2), ymd(2010, 1, 5), ymd(2010, 1, 10)]);
    assert_eq!(sim.events_processed(), 3);
}

#[test]
fn test_empty_days_are_skipped() {
    let (mut sim, id) = started(1);
    let f = fired();
    sim.schedule_event(Event::population(id, "only", note(&f, "only")), ymd(2010, 6, 1))
        .unwrap();

    sim.run(ymd(2010, 12, 31)).unwrap();

    assert_eq!(dates(&f), vec![ymd(2010, 6, 1)]);
    // the queue drained, so the loop stopped the day after the last event
    assert_eq!(sim.date(), ymd(2010, 6, 2));
}

#[test]
fn test_event_scheduled_for_today_fires_today() {
    let (mut sim, id) = started(1);
    let f = fired();
    let inner = f.clone();
    let spawner = move |sim: &mut Simulation| -> Result<(), SimulationError> {
        let today = sim.date();
        sim.schedule_event(Event::population(id, "child", note(&inner, "child")), today)?;
        Ok(())
    };
    sim.schedule_event(Event::population(id, "parent", spawner), ymd(2010, 1, 3))
        .unwrap();

    sim.run(ymd(2010, 1, 3)).unwrap();

    assert_eq!(dates(&f), vec![ymd(2010, 1, 3)]);
}

// ============================================================================
// Regular events
// ============================================================================

#[test]
fn test_monthly_event_from_month_end_steps_from_last_date() {
    let (mut sim, id) = started(1);
    let f = fired();
    let monthly = Event::population(id, "monthly", note(&f, "monthly")).every(Frequency::Months(1));
    sim.schedule_event(monthly, ymd(2010, 1, 31)).unwrap();

    sim.run(ymd(2010, 5, 31)).unwrap();

    assert_eq!(
        dates(&f),
        vec![
            ymd(2010, 1, 31),
            ymd(2010, 2, 28),
            ymd(2010, 3, 28),
            ymd(2010, 4, 28),
            ymd(2010, 5, 28),
        ]
    );
    // the next occurrence is already queued
    assert_eq!(sim.queue_len(), 1);
}

#[test]
fn test_deactivated_series_stops() {
    let (mut sim, id) = started(1);
    let f = fired();
    let ticker = Event::population(id, "tick", note(&f, "tick")).every(Frequency::Days(1));
    let ticker_id = sim.schedule_event(ticker, sim.date()).unwrap();
    let stop = move |sim: &mut Simulation| -> Result<(), SimulationError> {
        sim.deactivate_event(id, ticker_id)
    };
    sim.schedule_event(
        Event::population(id, "stop", stop).with_priority(EventPriority::EndOfDay),
        ymd(2010, 1, 3),
    )
    .unwrap();

    sim.run(ymd(2010, 1, 10)).unwrap();

    assert_eq!(dates(&f), vec![ymd(2010, 1, 1), ymd(2010, 1, 2), ymd(2010, 1, 3)]);
    assert_eq!(sim.queue_len(), 0);
}

#[test]
fn test_deactivate_checks_ownership() {
    let trace = trace();
    let mut sim = Simulation::new(config(7));
    let owner = sim.register(Recorder::new("Owner", &trace)).unwrap();
    let other = sim.register(Recorder::new("Other", &trace)).unwrap();
    sim.create_initial_population(1).unwrap();
    sim.initialise_simulation().unwrap();
    let f = fired();
    let id = sim
        .schedule_event(
            Event::population(owner, "tick", note(&f, "tick")).every(Frequency::Days(1)),
            sim.date(),
        )
        .unwrap();

    assert!(matches!(
        sim.deactivate_event(other, id),
        Err(SimulationError::Scheduling(SchedulingError::NotEventOwner { .. }))
    ));
    assert!(matches!(
        sim.deactivate_event(owner, health_simulator_core_rs::EventId(999)),
        Err(SimulationError::Scheduling(SchedulingError::UnknownEvent(_)))
    ));
    assert!(sim.deactivate_event(owner, id).is_ok());
}

#[test]
fn test_zero_frequency_rejected() {
    let (mut sim, id) = started(1);
    let f = fired();
    let result = sim.schedule_event(
        Event::population(id, "stuck", note(&f, "stuck")).every(Frequency::Days(0)),
        sim.date(),
    );
    assert!(matches!(
        result,
        Err(SimulationError::Scheduling(SchedulingError::ZeroFrequency(_)))
    ));
}

#[test]
fn test_scheduling_in_past_rejected() {
    let (mut sim, id) = started(1);
    let f = fired();
    sim.schedule_event(Event::population(id, "later", note(&f, "later")), ymd(2010, 1, 5))
        .unwrap();
    sim.run(ymd(2010, 1, 5)).unwrap();

    let result = sim.schedule_event(Event::population(id, "late", note(&f, "late")), ymd(2010, 1, 1));
    assert!(matches!(
        result,
        Err(SimulationError::Scheduling(SchedulingError::InPast { .. }))
    ));
}

// ============================================================================
// Individual events
// ============================================================================

#[test]
fn test_individual_event_skipped_for_dead_target() {
    let (mut sim, id) = started(3);
    let f = fired();
    for person in [0, 1] {
        let inner = f.clone();
        let visit = move |p: PersonId, sim: &mut Simulation| -> Result<(), SimulationError> {
            inner.borrow_mut().push((sim.date(), format!("visit:{}", p)));
            Ok(())
        };
        sim.schedule_event(Event::individual(id, "visit", PersonId(person), visit), ymd(2010, 1, 2))
            .unwrap();
    }
    sim.columns(id).mark_dead(PersonId(1)).unwrap();

    sim.run(ymd(2010, 1, 2)).unwrap();

    assert_eq!(labels(&f), vec!["visit:0"]);
    assert_eq!(sim.events_processed(), 1);
}

#[test]
fn test_regular_individual_event_stops_at_death() {
    let (mut sim, id) = started(2);
    let f = fired();
    let inner = f.clone();
    let checkup = move |p: PersonId, sim: &mut Simulation| -> Result<(), SimulationError> {
        inner.borrow_mut().push((sim.date(), format!("checkup:{}", p)));
        Ok(())
    };
    sim.schedule_event(
        Event::individual(id, "checkup", PersonId(0), checkup).every(Frequency::Days(1)),
        sim.date(),
    )
    .unwrap();
    let kill = move |sim: &mut Simulation| -> Result<(), SimulationError> {
        sim.columns(id).mark_dead(PersonId(0))?;
        Ok(())
    };
    sim.schedule_event(
        Event::population(id, "kill", kill).with_priority(EventPriority::EndOfDay),
        ymd(2010, 1, 3),
    )
    .unwrap();

    sim.run(ymd(2010, 1, 10)).unwrap();

    assert_eq!(dates(&f), vec![ymd(2010, 1, 1), ymd(2010, 1, 2), ymd(2010, 1, 3)]);
    assert_eq!(sim.queue_len(), 0);
}

#[test]
fn test_event_error_aborts_run() {
    let (mut sim, id) = started(1);
    let bad = move |sim: &mut Simulation| -> Result<(), SimulationError> {
        // writing a column nobody declared is a contract violation
        sim.columns(id).set(PersonId(0), "no_such_column", true)?;
        Ok(())
    };
    sim.schedule_event(Event::population(id, "bad", bad), sim.date())
        .unwrap();

    assert!(matches!(
        sim.run(ymd(2010, 1, 2)),
        Err(SimulationError::Population(_))
    ));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_lifecycle_order_enforced() {
    let trace = trace();
    let mut sim = Simulation::new(config(7));
    sim.register(Recorder::new("A", &trace)).unwrap();

    assert!(matches!(sim.initialise_simulation(), Err(SimulationError::Lifecycle(_))));
    assert!(matches!(sim.run(ymd(2010, 2, 1)), Err(SimulationError::Lifecycle(_))));

    sim.create_initial_population(2).unwrap();
    assert!(matches!(
        sim.create_initial_population(2),
        Err(SimulationError::Lifecycle(_))
    ));
    sim.initialise_simulation().unwrap();
    assert!(matches!(sim.initialise_simulation(), Err(SimulationError::Lifecycle(_))));
}

#[test]
fn test_simulate_returns_summary_and_logs_bounds() {
    let (mut sim, id) = started(4);
    let f = fired();
    sim.schedule_event(
        Event::population(id, "weekly", note(&f, "weekly")).every(Frequency::Days(7)),
        sim.date(),
    )
    .unwrap();

    let summary = sim.simulate(ymd(2010, 1, 29)).unwrap();

    assert_eq!(summary.start_date, ymd(2010, 1, 1));
    assert_eq!(summary.end_date, ymd(2010, 1, 29));
    assert_eq!(summary.events_processed, 5);
    assert_eq!(summary.population_size, 4);
    assert_eq!(summary.alive, 4);

    let log = sim.event_log().unwrap();
    assert!(matches!(
        log.events().first(),
        Some(LogRecord::SimulationStarted { population_size: 4, .. })
    ));
    assert!(matches!(
        log.events().last(),
        Some(LogRecord::SimulationEnded { events_processed: 5, .. })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A daily-cadence series over a window of `w` days fires `w / f + 1` times, `f` apart
    #[test]
    fn prop_regular_cadence(f in 1u32..15, w in 0i64..120) {
        let (mut sim, id) = started(1);
        let fired = fired();
        let start = sim.date();
        sim.schedule_event(
            Event::population(id, "tick", note(&fired, "tick")).every(Frequency::Days(f)),
            start,
        )
        .unwrap();

        sim.run(start + chrono::Duration::days(w)).unwrap();

        let dates = dates(&fired);
        prop_assert_eq!(dates.len() as i64, w / i64::from(f) + 1);
        for pair in dates.windows(2) {
            prop_assert_eq!((pair[1] - pair[0]).num_days(), i64::from(f));
        }
    }
}
