//! Time management for the simulation
//!
//! The simulation operates on calendar days. There is a single global clock,
//! advanced in whole-day steps by the main loop. Periodic work is expressed as
//! a [`Frequency`]: each occurrence is due one step after the nominal date of
//! the previous one, whatever day that occurrence actually ran on. Month steps
//! clamp to the last day of a shorter month and carry the clamped day forward.

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Calendar frequency of a recurring event
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use health_simulator_core_rs::Frequency;
///
/// let jan = NaiveDate::from_ymd_opt(2010, 1, 31).unwrap();
/// let monthly = Frequency::Months(1);
/// let feb = monthly.after(jan).unwrap();
/// assert_eq!(feb, NaiveDate::from_ymd_opt(2010, 2, 28).unwrap());
/// assert_eq!(monthly.after(feb), NaiveDate::from_ymd_opt(2010, 3, 28));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Days(u32),
    Months(u32),
    Years(u32),
}

impl Frequency {
    /// Date one step after `date`.
    ///
    /// Returns `None` if the result falls outside the representable calendar.
    pub fn after(&self, date: NaiveDate) -> Option<NaiveDate> {
        match *self {
            Frequency::Days(days) => date.checked_add_days(Days::new(u64::from(days))),
            Frequency::Months(months) => date.checked_add_months(Months::new(months)),
            Frequency::Years(years) => {
                date.checked_add_months(Months::new(years.checked_mul(12)?))
            }
        }
    }

    /// A zero frequency would re-fire on the same day forever
    pub fn is_zero(&self) -> bool {
        matches!(
            self,
            Frequency::Days(0) | Frequency::Months(0) | Frequency::Years(0)
        )
    }
}

/// The global simulation clock
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use health_simulator_core_rs::SimClock;
///
/// let start = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
/// let mut clock = SimClock::new(start);
/// clock.advance_day();
/// assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2010, 1, 2).unwrap());
/// assert_eq!(clock.days_elapsed(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimClock {
    /// Date the simulation started on
    start: NaiveDate,
    /// Current simulated date
    today: NaiveDate,
}

impl SimClock {
    /// Create a clock positioned on `start`
    pub fn new(start: NaiveDate) -> Self {
        Self {
            start,
            today: start,
        }
    }

    /// Current simulated date
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Date the simulation started on
    pub fn start_date(&self) -> NaiveDate {
        self.start
    }

    /// Whole days since the start date
    pub fn days_elapsed(&self) -> i64 {
        (self.today - self.start).num_days()
    }

    /// Advance time by one day
    pub fn advance_day(&mut self) {
        if let Some(next) = self.today.succ_opt() {
            self.today = next;
        }
    }

    /// Jump forward to `date`. Moving backwards is ignored.
    pub fn advance_to(&mut self, date: NaiveDate) {
        debug_assert!(date >= self.today, "clock cannot move backwards");
        if date > self.today {
            self.today = date;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_monthly_steps_from_previous_date() {
        let f = Frequency::Months(1);
        assert_eq!(f.after(ymd(2011, 1, 31)), Some(ymd(2011, 2, 28)));
        assert_eq!(f.after(ymd(2011, 2, 28)), Some(ymd(2011, 3, 28)));
        assert_eq!(f.after(ymd(2011, 12, 15)), Some(ymd(2012, 1, 15)));
    }

    #[test]
    fn test_yearly_from_leap_day() {
        let f = Frequency::Years(1);
        assert_eq!(f.after(ymd(2012, 2, 29)), Some(ymd(2013, 2, 28)));
        assert_eq!(f.after(ymd(2013, 2, 28)), Some(ymd(2014, 2, 28)));
    }

    #[test]
    fn test_zero_frequency_detected() {
        assert!(Frequency::Days(0).is_zero());
        assert!(!Frequency::Months(3).is_zero());
    }

    #[test]
    fn test_advance_to_jumps_forward() {
        let mut clock = SimClock::new(ymd(2010, 1, 1));
        clock.advance_to(ymd(2010, 1, 10));
        assert_eq!(clock.today(), ymd(2010, 1, 10));
        assert_eq!(clock.days_elapsed(), 9);
    }
}
