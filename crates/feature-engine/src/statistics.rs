//! Statistical Features Computation

/// Summary statistics over a window of samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticalFeatures {
    /// Number of samples
    pub count: usize,
    /// Mean value
    pub mean: f64,
    /// Population variance
    pub variance: f64,
    /// Standard deviation
    pub std_dev: f64,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Mean absolute change between consecutive samples
    pub rate_of_change: f64,
    /// (last - first) / count, the per-sample drift across the window
    pub trend: f64,
}

impl StatisticalFeatures {
    /// Compute statistical features from a slice of values
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let min = values.iter().cloned().fold(f64::MAX, f64::min);
        let max = values.iter().cloned().fold(f64::MIN, f64::max);

        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

        let rate_of_change = if values.len() >= 2 {
            let total: f64 = values.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
            total / (values.len() - 1) as f64
        } else {
            0.0
        };

        let trend = (values[values.len() - 1] - values[0]) / n;

        Self {
            count: values.len(),
            mean,
            variance,
            std_dev: variance.sqrt(),
            min,
            max,
            rate_of_change,
            trend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_computation() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let stats = StatisticalFeatures::compute(&values);
        assert!((stats.mean - 3.0).abs() < 0.001);
        assert!((stats.trend - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_std_dev_computation() {
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stats = StatisticalFeatures::compute(&values);
        assert!((stats.std_dev - 2.0).abs() < 0.001);
        assert!((stats.variance - 4.0).abs() < 0.001);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
    }

    #[test]
    fn test_empty_window() {
        let stats = StatisticalFeatures::compute(&[]);
        assert_eq!(stats, StatisticalFeatures::default());
    }
}
