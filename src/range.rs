use serde::{Deserialize, Serialize};

/// Evenly spaced axis definition for detector binning.
///
/// `count` is the number of bin *edges*, so an axis with `count` points has
/// `count - 1` bins. `delta` is the edge spacing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoubleRange {
    pub start: f64,
    pub stop: f64,
    pub count: usize,
}

impl DoubleRange {
    pub fn new(start: f64, stop: f64, count: usize) -> Self {
        Self { start, stop, count }
    }

    /// Spacing between adjacent edges.
    pub fn delta(&self) -> f64 {
        if self.count < 2 {
            return self.stop - self.start;
        }
        (self.stop - self.start) / (self.count - 1) as f64
    }

    /// Number of bins spanned by this axis.
    pub fn bin_count(&self) -> usize {
        self.count.saturating_sub(1)
    }

    /// Midpoint of bin `i`.
    pub fn midpoint(&self, i: usize) -> f64 {
        self.start + (i as f64 + 0.5) * self.delta()
    }
}

impl Default for DoubleRange {
    fn default() -> Self {
        Self { start: 0.0, stop: 1.0, count: 2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta() {
        let r = DoubleRange::new(0.0, 10.0, 101);
        assert!((r.delta() - 0.1).abs() < 1e-12);
        assert_eq!(r.bin_count(), 100);
    }

    #[test]
    fn test_midpoint_with_offset_start() {
        let r = DoubleRange::new(2.0, 4.0, 3);
        assert!((r.midpoint(0) - 2.5).abs() < 1e-12);
        assert!((r.midpoint(1) - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_serde_round_trip() {
        let r = DoubleRange::new(0.0, 1.0, 51);
        let json = serde_json::to_string(&r).unwrap();
        let back: DoubleRange = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }
}
