use anyhow::{Result, ensure};
use std::collections::VecDeque;

/// FIFO of power values [W] waiting to be applied, one per time slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowersQueue {
    values: VecDeque<f64>,
    capacity: Option<usize>,
}

impl PowersQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue holding at most `capacity` pending values.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    pub fn push(&mut self, power: f64) -> Result<()> {
        ensure!(
            power.is_finite(),
            "power value must be finite (got {power})"
        );
        if let Some(capacity) = self.capacity {
            ensure!(
                self.values.len() < capacity,
                "powers queue is full ({capacity} values)"
            );
        }
        self.values.push_back(power);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<f64> {
        self.values.pop_front()
    }

    pub fn peek(&self) -> Option<f64> {
        self.values.front().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|c| self.values.len() >= c)
    }
}
