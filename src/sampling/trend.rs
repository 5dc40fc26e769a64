use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub index: u64,
    pub value: f64,
}

/// Append-only history of one channel for the full-session trend plot.
#[derive(Debug, Clone, Default)]
pub struct TrendBuffer {
    points: Vec<TrendPoint>,
    next_index: u64,
}

impl TrendBuffer {
    /// The first pushed point gets index `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            points: Vec::new(),
            next_index: seed,
        }
    }

    /// Append `value` and return the index it was stored at.
    pub fn push_unbounded(&mut self, value: f64) -> u64 {
        let index = self.next_index;
        self.points.push(TrendPoint { index, value });
        self.next_index += 1;
        index
    }

    pub fn points(&self) -> &[TrendPoint] {
        &self.points
    }

    pub fn last(&self) -> Option<&TrendPoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_increase_by_one_from_seed() {
        let mut trend = TrendBuffer::with_seed(10);
        assert_eq!(trend.push_unbounded(1.5), 10);
        assert_eq!(trend.push_unbounded(2.5), 11);
        assert_eq!(trend.push_unbounded(-0.5), 12);

        let indices: Vec<u64> = trend.points().iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![10, 11, 12]);
        assert_eq!(trend.last().map(|p| p.value), Some(-0.5));
    }

    #[test]
    fn never_trims() {
        let mut trend = TrendBuffer::default();
        for i in 0..1000 {
            trend.push_unbounded(i as f64);
        }
        assert_eq!(trend.len(), 1000);
        assert_eq!(trend.points()[0].value, 0.0);
    }
}
