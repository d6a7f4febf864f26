//! Consumables availability
//!
//! An HSI event can ask whether the consumables it needs are in stock. The
//! answer comes from a pluggable oracle and is informational only: it never
//! gates admission, the event decides what to do with it.

use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumableCode {
    /// Intervention package
    Package(u32),
    /// Individual item
    Item(u32),
}

impl fmt::Display for ConsumableCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumableCode::Package(code) => write!(f, "pkg:{}", code),
            ConsumableCode::Item(code) => write!(f, "item:{}", code),
        }
    }
}

/// What an HSI event needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumableFootprint {
    pub intervention_package_codes: Vec<u32>,
    /// Item code -> quantity
    pub item_codes: BTreeMap<u32, u32>,
}

impl ConsumableFootprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(mut self, code: u32) -> Self {
        self.intervention_package_codes.push(code);
        self
    }

    pub fn with_item(mut self, code: u32, quantity: u32) -> Self {
        *self.item_codes.entry(code).or_insert(0) += quantity;
        self
    }

    /// Every requested code with its quantity (packages count as one)
    pub fn codes(&self) -> Vec<(ConsumableCode, u32)> {
        let packages = self
            .intervention_package_codes
            .iter()
            .map(|&c| (ConsumableCode::Package(c), 1));
        let items = self
            .item_codes
            .iter()
            .map(|(&c, &q)| (ConsumableCode::Item(c), q));
        packages.chain(items).collect()
    }
}

/// Per-code answer to a consumables request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumableResponse {
    available: BTreeMap<ConsumableCode, bool>,
}

impl ConsumableResponse {
    pub(crate) fn insert(&mut self, code: ConsumableCode, available: bool) {
        self.available.insert(code, available);
    }

    /// `false` for codes that were not requested
    pub fn is_available(&self, code: ConsumableCode) -> bool {
        self.available.get(&code).copied().unwrap_or(false)
    }

    pub fn all_available(&self) -> bool {
        self.available.values().all(|&ok| ok)
    }

    pub fn unavailable(&self) -> Vec<ConsumableCode> {
        self.available
            .iter()
            .filter(|(_, &ok)| !ok)
            .map(|(&code, _)| code)
            .collect()
    }

    /// Code labels as they appear in the record stream
    pub fn to_labels(&self) -> BTreeMap<String, bool> {
        self.available
            .iter()
            .map(|(code, &ok)| (code.to_string(), ok))
            .collect()
    }
}

/// Oracle answering whether a consumable is available
pub trait ConsumableAvailability {
    fn is_available(
        &mut self,
        code: ConsumableCode,
        quantity: u32,
        facility_level: u8,
        rng: &mut RngManager,
    ) -> bool;
}

/// Everything is always in stock
#[derive(Debug, Clone, Copy, Default)]
pub struct AllConsumablesAvailable;

impl ConsumableAvailability for AllConsumablesAvailable {
    fn is_available(&mut self, _: ConsumableCode, _: u32, _: u8, _: &mut RngManager) -> bool {
        true
    }
}

/// Each code is available with a fixed probability
///
/// Built from an already-typed code -> probability table; codes missing from
/// the table use `default_probability`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilisticAvailability {
    #[serde(default)]
    pub package_probabilities: BTreeMap<u32, f64>,
    #[serde(default)]
    pub item_probabilities: BTreeMap<u32, f64>,
    #[serde(default = "default_probability")]
    pub default_probability: f64,
}

fn default_probability() -> f64 {
    1.0
}

impl ProbabilisticAvailability {
    pub fn new(default_probability: f64) -> Self {
        Self {
            package_probabilities: BTreeMap::new(),
            item_probabilities: BTreeMap::new(),
            default_probability,
        }
    }

    pub fn with_package(mut self, code: u32, probability: f64) -> Self {
        self.package_probabilities.insert(code, probability);
        self
    }

    pub fn with_item(mut self, code: u32, probability: f64) -> Self {
        self.item_probabilities.insert(code, probability);
        self
    }

    fn probability(&self, code: ConsumableCode) -> f64 {
        let table = match code {
            ConsumableCode::Package(c) => self.package_probabilities.get(&c),
            ConsumableCode::Item(c) => self.item_probabilities.get(&c),
        };
        table.copied().unwrap_or(self.default_probability)
    }
}

impl ConsumableAvailability for ProbabilisticAvailability {
    fn is_available(
        &mut self,
        code: ConsumableCode,
        _quantity: u32,
        _facility_level: u8,
        rng: &mut RngManager,
    ) -> bool {
        rng.bernoulli(self.probability(code))
    }
}
