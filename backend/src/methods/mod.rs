//! Reference collaborator modules
//!
//! Small stand-ins for the demography and disease modules a real model would
//! register. They exercise every hook of the module contract and every path
//! of the health-system scheduler; they are not natural-history models.

pub mod chronic_syndrome;
pub mod demography;
pub mod mockitis;

pub use chronic_syndrome::{ChronicSyndrome, ChronicSyndromeConfig};
pub use demography::{Demography, DemographyConfig};
pub use mockitis::{Mockitis, MockitisConfig};

use crate::orchestrator::SimulationError;

/// Reject probabilities outside `[0, 1]`
pub(crate) fn check_probability(module: &str, name: &str, value: f64) -> Result<(), SimulationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SimulationError::InvalidParameter {
            module: module.to_string(),
            message: format!("{} must be a probability in [0, 1], got {}", name, value),
        })
    }
}
