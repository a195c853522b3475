use chrono::Utc;
use serde::{Deserialize, Serialize};
use sprt_core::params::Decision;
use strum::{Display, EnumString, IntoStaticStr};

pub fn timestamp_string() -> String {
    Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Which experiment design a driver run checks.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Display,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    OneSample,
    TwoSample,
}

/// One simulated test, as written to the output CSV. `result_code` is
/// the numeric encoding of the decision (1 high/directional, -1
/// low/null, 0 continuing) for downstream tables.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial: usize,
    pub decision: Decision,
    pub result_code: i8,
    pub duration: u64,
    pub successes: u64,
    pub second_successes: Option<u64>,
}

impl TrialRecord {
    pub fn new(
        trial: usize,
        decision: Decision,
        duration: u64,
        successes: u64,
        second_successes: Option<u64>,
    ) -> Self {
        Self {
            trial,
            decision,
            result_code: decision.result_code(),
            duration,
            successes,
            second_successes,
        }
    }
}

/// Running per-decision counts over a simulation run.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct DecisionTally {
    pub undecided: u64,
    pub accept_low: u64,
    pub accept_high: u64,
    pub accept_greater: u64,
    pub accept_less: u64,
    pub accept_null: u64,
    pub total_duration: u64,
}

impl DecisionTally {
    pub fn add(&mut self, record: &TrialRecord) {
        match record.decision {
            Decision::Continue => self.undecided += 1,
            Decision::AcceptLow => self.accept_low += 1,
            Decision::AcceptHigh => self.accept_high += 1,
            Decision::AcceptGreater => self.accept_greater += 1,
            Decision::AcceptLess => self.accept_less += 1,
            Decision::AcceptNull => self.accept_null += 1,
        }
        self.total_duration += record.duration;
    }

    pub fn total(&self) -> u64 {
        self.undecided
            + self.accept_low
            + self.accept_high
            + self.accept_greater
            + self.accept_less
            + self.accept_null
    }

    pub fn count(&self, decision: Decision) -> u64 {
        match decision {
            Decision::Continue => self.undecided,
            Decision::AcceptLow => self.accept_low,
            Decision::AcceptHigh => self.accept_high,
            Decision::AcceptGreater => self.accept_greater,
            Decision::AcceptLess => self.accept_less,
            Decision::AcceptNull => self.accept_null,
        }
    }

    pub fn rate(&self, decision: Decision) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.count(decision) as f64 / self.total() as f64
    }

    pub fn mean_duration(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.total_duration as f64 / self.total() as f64
    }
}
