//! Pluggable capacity model
//!
//! The scheduler asks the model for a squeeze factor before running an HSI
//! event and reports the footprint after admission. How capacity is actually
//! accounted is up to the implementation; the kernel only relies on the
//! squeeze factor being a nonnegative number.

use crate::healthsystem::AppointmentFootprint;
use chrono::NaiveDate;

/// What an HSI event asks of the system
#[derive(Debug, Clone, Copy)]
pub struct CapacityRequest<'a> {
    pub treatment_id: &'a str,
    pub footprint: &'a AppointmentFootprint,
    pub facility_level: u8,
    pub date: NaiveDate,
}

pub trait CapacityModel {
    /// Reset per-day accounting
    fn begin_day(&mut self, _date: NaiveDate) {}

    /// Contention for this request; zero means no squeeze
    fn squeeze_factor(&self, request: &CapacityRequest<'_>) -> f64;

    /// Account for an admitted request
    fn record_usage(&mut self, _request: &CapacityRequest<'_>) {}

    /// Share of today's nominal capacity used so far
    fn fraction_time_used(&self) -> f64 {
        0.0
    }

    /// Scale nominal capacity
    fn set_capabilities_coefficient(&mut self, _coefficient: f64) {}
}

/// Capacity is never a constraint
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconstrainedCapacity;

impl CapacityModel for UnconstrainedCapacity {
    fn squeeze_factor(&self, _request: &CapacityRequest<'_>) -> f64 {
        0.0
    }
}

/// Fixed daily budget of appointment units
///
/// Squeeze is how far the request would push usage past the budget,
/// relative to the budget. Useful for scenarios and tests that need
/// contention without a full staffing model.
#[derive(Debug, Clone)]
pub struct DailyBudgetCapacity {
    nominal_units: f64,
    coefficient: f64,
    used_units: f64,
}

impl DailyBudgetCapacity {
    pub fn new(nominal_units: f64) -> Self {
        Self {
            nominal_units,
            coefficient: 1.0,
            used_units: 0.0,
        }
    }

    fn budget(&self) -> f64 {
        self.nominal_units * self.coefficient
    }
}

impl CapacityModel for DailyBudgetCapacity {
    fn begin_day(&mut self, _date: NaiveDate) {
        self.used_units = 0.0;
    }

    fn squeeze_factor(&self, request: &CapacityRequest<'_>) -> f64 {
        let budget = self.budget();
        let after = self.used_units + request.footprint.total();
        if budget <= 0.0 {
            return if after > 0.0 { f64::INFINITY } else { 0.0 };
        }
        ((after - budget) / budget).max(0.0)
    }

    fn record_usage(&mut self, request: &CapacityRequest<'_>) {
        self.used_units += request.footprint.total();
    }

    fn fraction_time_used(&self) -> f64 {
        let budget = self.budget();
        if budget <= 0.0 {
            return 0.0;
        }
        self.used_units / budget
    }

    fn set_capabilities_coefficient(&mut self, coefficient: f64) {
        self.coefficient = coefficient;
    }
}
