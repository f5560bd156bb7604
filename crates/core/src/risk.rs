//! Transmission risk calculation and the infectiousness filter.
//!
//! Both are pure: identical inputs always give identical answers, which is
//! what lets an engine run be repeated without changing its output.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{InfectiousPeriodType, TransmissionRiskLevel};

/// Maps days since symptom onset to a risk level.
pub trait TransmissionRiskCalculation: Send + Sync {
    /// Inclusive range of days for which `calculate` can return a level.
    fn significant_day_range(&self) -> (i32, i32);

    fn calculate(&self, days_since_onset: i32) -> TransmissionRiskLevel;

    /// Highest level across `[lo, hi]`; `None` only when every day is `None`.
    fn calculate_range(&self, lo: i32, hi: i32) -> TransmissionRiskLevel {
        (lo..=hi)
            .map(|day| self.calculate(day))
            .max()
            .unwrap_or(TransmissionRiskLevel::None)
    }
}

/// Day bands used for locally published keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardTrlCalculation;

impl TransmissionRiskCalculation for StandardTrlCalculation {
    fn significant_day_range(&self) -> (i32, i32) {
        (-2, 11)
    }

    fn calculate(&self, days_since_onset: i32) -> TransmissionRiskLevel {
        match days_since_onset {
            -2..=2 => TransmissionRiskLevel::High,
            3..=4 => TransmissionRiskLevel::Medium,
            5..=11 => TransmissionRiskLevel::Low,
            _ => TransmissionRiskLevel::None,
        }
    }
}

/// Configured infectious offsets per symptom category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfectiousnessConfig {
    pub symptomatic: BTreeSet<i32>,
    pub asymptomatic: BTreeSet<i32>,
}

impl Default for InfectiousnessConfig {
    fn default() -> Self {
        InfectiousnessConfig {
            symptomatic: (-2..=11).collect(),
            asymptomatic: (0..=11).collect(),
        }
    }
}

/// Decides whether a key is released given its symptom category and offset.
#[derive(Debug, Clone)]
pub struct Infectiousness {
    offsets: HashMap<InfectiousPeriodType, BTreeSet<i32>>,
}

impl Infectiousness {
    pub fn new(offsets: HashMap<InfectiousPeriodType, BTreeSet<i32>>) -> Self {
        Infectiousness { offsets }
    }

    pub fn from_config(config: &InfectiousnessConfig) -> Self {
        let mut offsets = HashMap::new();
        offsets.insert(InfectiousPeriodType::Symptomatic, config.symptomatic.clone());
        offsets.insert(InfectiousPeriodType::Asymptomatic, config.asymptomatic.clone());
        Infectiousness { offsets }
    }

    pub fn is_infectious(&self, symptomatic: InfectiousPeriodType, days_since_onset: i32) -> bool {
        self.offsets
            .get(&symptomatic)
            .is_some_and(|set| set.contains(&days_since_onset))
    }
}
