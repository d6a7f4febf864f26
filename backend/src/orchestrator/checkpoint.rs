//! Checkpoint - Snapshot of the entity table
//!
//! Captures the full entity table plus the RNG state in a canonical,
//! serializable form. Its SHA-256 digest is what determinism checks compare:
//! two runs with the same seed and module set must produce the same digest.
//!
//! # Critical Invariants
//!
//! - **Canonical order**: columns in declaration order, rows in id order
//! - **No hash iteration**: nothing in the snapshot depends on HashMap order

use crate::models::population::Population;
use crate::models::property::PropertyValue;
use crate::orchestrator::SimulationError;
use crate::registry::ModuleRegistry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Entity-table snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    /// Simulated date at capture
    pub date: NaiveDate,

    /// RNG state at capture
    pub rng_state: u64,

    /// Rows ever created
    pub size: usize,

    /// Every column, in declaration order
    pub columns: Vec<ColumnSnapshot>,
}

/// One column of the entity table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    pub name: String,
    /// Name of the owning module ("kernel" for built-ins)
    pub owner: String,
    pub values: Vec<PropertyValue>,
}

impl PopulationSnapshot {
    pub fn capture(
        date: NaiveDate,
        rng_state: u64,
        population: &Population,
        modules: &ModuleRegistry,
    ) -> Self {
        let columns = population
            .property_names()
            .into_iter()
            .map(|name| ColumnSnapshot {
                name: name.to_string(),
                owner: population
                    .owner_of(name)
                    .map(|id| modules.name(id).to_string())
                    .unwrap_or_default(),
                values: population.column_values(name).unwrap_or_default(),
            })
            .collect();
        Self {
            date,
            rng_state,
            size: population.len(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSnapshot> {
        self.columns.iter().find(|c| c.name == name)
    }
}

// ============================================================================
// Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of a snapshot
///
/// Struct fields serialize in declaration order and every collection in the
/// snapshot is a `Vec`, so the JSON text is canonical.
pub fn compute_digest(snapshot: &PopulationSnapshot) -> Result<String, SimulationError> {
    let json = serde_json::to_string(snapshot)?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let result = hasher.finalize();

    Ok(format!("{:x}", result))
}
