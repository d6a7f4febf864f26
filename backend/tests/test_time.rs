//! Tests for the simulation clock and event frequencies

use chrono::{Datelike, NaiveDate};
use health_simulator_core_rs::{Frequency, SimClock};
use proptest::prelude::*;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_clock_new() {
    let clock = SimClock::new(ymd(2010, 1, 1));
    assert_eq!(clock.today(), ymd(2010, 1, 1));
    assert_eq!(clock.start_date(), ymd(2010, 1, 1));
    assert_eq!(clock.days_elapsed(), 0);
}

#[test]
fn test_advance_day_crosses_month_and_year() {
    let mut clock = SimClock::new(ymd(2010, 12, 30));

    clock.advance_day();
    assert_eq!(clock.today(), ymd(2010, 12, 31));

    clock.advance_day();
    assert_eq!(clock.today(), ymd(2011, 1, 1));
    assert_eq!(clock.days_elapsed(), 2);
}

#[test]
fn test_leap_day() {
    let mut clock = SimClock::new(ymd(2012, 2, 28));
    clock.advance_day();
    assert_eq!(clock.today(), ymd(2012, 2, 29));
    clock.advance_day();
    assert_eq!(clock.today(), ymd(2012, 3, 1));
}

#[test]
fn test_each_step_is_one_frequency() {
    let start = ymd(2010, 5, 17);
    assert_eq!(Frequency::Days(3).after(start), Some(ymd(2010, 5, 20)));
    assert_eq!(Frequency::Months(2).after(start), Some(ymd(2010, 7, 17)));
    assert_eq!(Frequency::Years(1).after(start), Some(ymd(2011, 5, 17)));
}

#[test]
fn test_monthly_from_month_end_keeps_clamped_day() {
    let monthly = Frequency::Months(1);
    let mut dates = vec![ymd(2010, 1, 31)];
    for _ in 0..3 {
        let last = *dates.last().unwrap();
        dates.push(monthly.after(last).unwrap());
    }
    assert_eq!(
        dates,
        vec![ymd(2010, 1, 31), ymd(2010, 2, 28), ymd(2010, 3, 28), ymd(2010, 4, 28)]
    );
}

#[test]
fn test_out_of_range_step_is_none() {
    assert_eq!(Frequency::Days(1).after(NaiveDate::MAX), None);
    assert_eq!(Frequency::Years(1).after(NaiveDate::MAX), None);
}

proptest! {
    /// Daily cadence is exact
    #[test]
    fn prop_days_are_exact(step in 1u32..40, day in 0i64..3650) {
        let from = ymd(2010, 1, 1) + chrono::Duration::days(day);
        let date = Frequency::Days(step).after(from).unwrap();
        prop_assert_eq!((date - from).num_days(), i64::from(step));
    }

    /// A monthly step lands in the next month, never past the current day
    #[test]
    fn prop_month_step_moves_one_month(day in 1u32..=31, month in 1u32..=12) {
        let Some(from) = NaiveDate::from_ymd_opt(2010, month, day) else {
            return Ok(());
        };
        let date = Frequency::Months(1).after(from).unwrap();
        let months = (date.year() - 2010) * 12 + date.month0() as i32;
        prop_assert_eq!(months, from.month0() as i32 + 1);
        prop_assert!(date.day() <= day);
    }

    /// Steps are strictly increasing
    #[test]
    fn prop_steps_increase(months in 1u32..13, day in 0i64..3650) {
        let from = ymd(2010, 1, 31) + chrono::Duration::days(day);
        let frequency = Frequency::Months(months);
        prop_assert!(frequency.after(from).unwrap() > from);
    }
}
