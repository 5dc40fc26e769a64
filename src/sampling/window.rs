use std::collections::VecDeque;

use crate::error::{MeterError, MeterResult};

pub const DEFAULT_WINDOW_CAPACITY: usize = 10;

/// Fixed-capacity FIFO of the most recent readings on one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl SampleWindow {
    /// A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn mean(&self) -> MeterResult<f64> {
        if self.values.is_empty() {
            return Err(MeterError::EmptyWindow);
        }
        Ok(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut w = SampleWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            w.push(v);
        }
        assert_eq!(w.to_vec(), vec![3.0, 4.0, 5.0]);
        assert_eq!(w.latest(), Some(5.0));
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let mut w = SampleWindow::new(10);
        for i in 0..57 {
            w.push(i as f64);
            assert_eq!(w.len(), (i + 1).min(10));
        }
        assert_eq!(w.len(), w.capacity());
    }

    #[test]
    fn mean_of_contents() {
        let mut w = SampleWindow::new(10);
        for v in [10.0, 12.0, 11.0] {
            w.push(v);
        }
        assert_eq!(w.mean().unwrap(), 11.0);
    }

    #[test]
    fn mean_of_empty_window_fails() {
        assert!(matches!(
            SampleWindow::default().mean(),
            Err(MeterError::EmptyWindow)
        ));
    }

    #[test]
    fn zero_capacity_holds_one_value() {
        let mut w = SampleWindow::new(0);
        w.push(1.0);
        w.push(2.0);
        assert_eq!(w.to_vec(), vec![2.0]);
    }
}
