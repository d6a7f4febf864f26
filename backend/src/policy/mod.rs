//! Health-System Admission Policy Module
//!
//! This module defines the policies the health-system scheduler consults
//! before running a clinical interaction.
//!
//! # Overview
//!
//! Two independent questions are asked for every due HSI event:
//! - **Service availability**: is this treatment offered at all? Answered by
//!   an ordered table of treatment-id patterns ([`ServiceAvailability`]).
//! - **Capacity**: how squeezed is the system right now? Answered by a
//!   pluggable [`CapacityModel`] returning a nonnegative squeeze factor.
//!
//! # Pattern Matching
//!
//! A pattern ending in `*` matches by prefix; anything else must match the
//! whole treatment id:
//! ```rust
//! use health_simulator_core_rs::policy::pattern_matches;
//!
//! assert!(pattern_matches("Mockitis*", "Mockitis"));
//! assert!(pattern_matches("Mockitis*", "Mockitis_Treatment"));
//! assert!(!pattern_matches("Mockitis*", "ChronicSyndrome_Mockitis"));
//! assert!(pattern_matches("*", "anything"));
//! ```
//!
//! # Rule Order
//!
//! Rules are tried in order and the first match decides. An empty table
//! allows everything; a non-empty table in which nothing matches denies.

pub mod capacity;

pub use capacity::{CapacityModel, CapacityRequest, DailyBudgetCapacity, UnconstrainedCapacity};

use serde::{Deserialize, Serialize};

/// One row of the service-availability table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRule {
    pub pattern: String,
    pub allowed: bool,
}

impl ServiceRule {
    pub fn allow(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            allowed: true,
        }
    }

    pub fn deny(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            allowed: false,
        }
    }
}

/// True if `pattern` covers `treatment_id`
pub fn pattern_matches(pattern: &str, treatment_id: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => treatment_id.starts_with(prefix),
        None => pattern == treatment_id,
    }
}

/// Ordered service-availability policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceAvailability {
    rules: Vec<ServiceRule>,
}

impl ServiceAvailability {
    /// Every treatment is available
    pub fn allow_all() -> Self {
        Self { rules: Vec::new() }
    }

    /// No treatment is available
    pub fn deny_all() -> Self {
        Self {
            rules: vec![ServiceRule::deny("*")],
        }
    }

    /// Only treatments matching one of `patterns` are available
    ///
    /// An empty list yields [`ServiceAvailability::deny_all`].
    pub fn allow_only(patterns: &[&str]) -> Self {
        if patterns.is_empty() {
            return Self::deny_all();
        }
        Self {
            rules: patterns.iter().map(|p| ServiceRule::allow(p)).collect(),
        }
    }

    /// Append a rule (tried after the existing ones)
    pub fn with_rule(mut self, pattern: &str, allowed: bool) -> Self {
        self.rules.push(ServiceRule {
            pattern: pattern.to_string(),
            allowed,
        });
        self
    }

    pub fn rules(&self) -> &[ServiceRule] {
        &self.rules
    }

    pub fn is_allowed(&self, treatment_id: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        self.rules
            .iter()
            .find(|rule| pattern_matches(&rule.pattern, treatment_id))
            .map(|rule| rule.allowed)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wildcard_prefix_matching() {
        assert!(pattern_matches("X*", "X"));
        assert!(pattern_matches("X*", "XY"));
        assert!(pattern_matches("X*", "X_Y"));
        assert!(!pattern_matches("X*", "YX"));
        assert!(pattern_matches("X", "X"));
        assert!(!pattern_matches("X", "XY"));
    }

    #[test]
    fn test_empty_policy_allows_everything() {
        let policy = ServiceAvailability::allow_all();
        assert!(policy.is_allowed("Mockitis_Treatment"));
        assert!(policy.is_allowed(""));
    }

    #[test]
    fn test_allow_only_empty_list_denies_everything() {
        let policy = ServiceAvailability::allow_only(&[]);
        assert!(!policy.is_allowed("Mockitis_Treatment"));
    }

    #[test]
    fn test_first_match_wins() {
        let policy = ServiceAvailability::default()
            .with_rule("Mockitis_Treatment", false)
            .with_rule("Mockitis*", true);
        assert!(!policy.is_allowed("Mockitis_Treatment"));
        assert!(policy.is_allowed("Mockitis_FollowUp"));
        assert!(!policy.is_allowed("ChronicSyndrome_Treatment"));
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let policy = ServiceAvailability::allow_only(&["Mockitis*"]);
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(json, r#"[{"pattern":"Mockitis*","allowed":true}]"#);
        let back: ServiceAvailability = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }

    proptest! {
        #[test]
        fn prop_prefix_pattern_matches_every_extension(
            prefix in "[A-Za-z_]{1,8}",
            suffix in "[A-Za-z_]{0,8}",
        ) {
            let pattern = format!("{}*", prefix);
            let treatment = format!("{}{}", prefix, suffix);
            prop_assert!(pattern_matches(&pattern, &treatment));
        }

        #[test]
        fn prop_prefix_pattern_rejects_other_starts(
            prefix in "[A-Z]{1,6}",
            other in "[a-z]{1,6}",
        ) {
            // lowercase and uppercase alphabets never share a first letter
            let pattern = format!("{}*", prefix);
            prop_assert!(!pattern_matches(&pattern, &other));
        }
    }
}
