use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

/// Kind of thermal analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisType {
    /// Single solve without thermal capacitance.
    Steady,
    /// Backward-Euler time stepping. Power values change once per slot.
    Transient {
        /// Time step [s].
        step_time: f64,
        /// Duration of one power slot [s]; a whole number of steps.
        slot_time: f64,
    },
}

/// Time bookkeeping of a simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    analysis_type: AnalysisType,
    /// Steps per slot (1 for steady analyses).
    slot_length: u64,
    /// Steps performed so far.
    current_time: u64,
    /// Uniform temperature of the stack before the first step [K].
    initial_temperature: f64,
}

impl Analysis {
    pub fn steady(initial_temperature: f64) -> Self {
        Self {
            analysis_type: AnalysisType::Steady,
            slot_length: 1,
            current_time: 0,
            initial_temperature,
        }
    }

    pub fn transient(step_time: f64, slot_time: f64, initial_temperature: f64) -> Result<Self> {
        ensure!(
            step_time.is_finite() && step_time > 0.0,
            "step time must be > 0 (got {step_time})"
        );
        ensure!(
            slot_time.is_finite() && slot_time >= step_time,
            "slot time must be >= step time (got {slot_time} < {step_time})"
        );
        let slot_length = (slot_time / step_time).round() as u64;
        Ok(Self {
            analysis_type: AnalysisType::Transient {
                step_time,
                slot_time,
            },
            slot_length: slot_length.max(1),
            current_time: 0,
            initial_temperature,
        })
    }

    pub fn from_type(analysis_type: AnalysisType, initial_temperature: f64) -> Result<Self> {
        match analysis_type {
            AnalysisType::Steady => Ok(Self::steady(initial_temperature)),
            AnalysisType::Transient {
                step_time,
                slot_time,
            } => Self::transient(step_time, slot_time, initial_temperature),
        }
    }

    pub fn analysis_type(&self) -> AnalysisType {
        self.analysis_type
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.analysis_type, AnalysisType::Transient { .. })
    }

    /// Time step for the capacity terms; `None` in steady state.
    pub fn delta_time(&self) -> Option<f64> {
        match self.analysis_type {
            AnalysisType::Steady => None,
            AnalysisType::Transient { step_time, .. } => Some(step_time),
        }
    }

    pub fn slot_length(&self) -> u64 {
        self.slot_length
    }

    pub fn current_time(&self) -> u64 {
        self.current_time
    }

    pub fn initial_temperature(&self) -> f64 {
        self.initial_temperature
    }

    /// Elapsed simulated time [s].
    pub fn simulated_time(&self) -> f64 {
        self.delta_time()
            .map_or(0.0, |dt| self.current_time as f64 * dt)
    }

    /// Whether the current step count sits on a slot boundary.
    pub fn slot_completed(&self) -> bool {
        self.is_transient() && self.current_time % self.slot_length == 0
    }

    pub(crate) fn increase_time(&mut self) {
        self.current_time += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_length_rounds_to_steps() {
        let a = Analysis::transient(2e-3, 20e-3, 300.0).unwrap();
        assert_eq!(a.slot_length(), 10);
        assert!(a.slot_completed());
        assert_eq!(a.simulated_time(), 0.0);
    }

    #[test]
    fn test_time_advances() {
        let mut a = Analysis::transient(1e-3, 2e-3, 300.0).unwrap();
        a.increase_time();
        assert!(!a.slot_completed());
        a.increase_time();
        assert!(a.slot_completed());
        assert!((a.simulated_time() - 2e-3).abs() < 1e-15);
    }

    #[test]
    fn test_rejects_bad_times() {
        assert!(Analysis::transient(0.0, 1.0, 300.0).is_err());
        assert!(Analysis::transient(1.0, 0.5, 300.0).is_err());
        let steady = Analysis::steady(300.0);
        assert!(!steady.is_transient());
        assert!(!steady.slot_completed());
        assert_eq!(steady.delta_time(), None);
    }
}
