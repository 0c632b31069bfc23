//! Statistical Features Computation

/// Statistics of one row of raw variables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowStatistics {
    /// Mean value
    pub mean: f64,
    /// Sample standard deviation (denominator n - 1)
    pub std_dev: f64,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Number of strictly positive values
    pub count_positive: usize,
    /// Number of strictly negative values
    pub count_negative: usize,
    /// Number of values seen
    pub count: usize,
}

impl RowStatistics {
    /// Compute row statistics from a sequence of values.
    ///
    /// Fewer than two values yield a standard deviation of 0 rather than NaN,
    /// so the derived columns never carry missing values.
    pub fn compute<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
        I::IntoIter: Clone,
    {
        let values = values.into_iter();

        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut count_positive = 0;
        let mut count_negative = 0;

        for v in values.clone() {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
            if v > 0.0 {
                count_positive += 1;
            } else if v < 0.0 {
                count_negative += 1;
            }
        }

        if count == 0 {
            return Self::default();
        }

        let mean = sum / count as f64;

        // Second pass keeps the variance stable for large offsets
        let m2: f64 = values.map(|v| (v - mean) * (v - mean)).sum();
        let std_dev = if count > 1 {
            (m2 / (count - 1) as f64).sqrt()
        } else {
            0.0
        };

        Self {
            mean,
            std_dev,
            min,
            max,
            count_positive,
            count_negative,
            count,
        }
    }

    /// Share of strictly positive values over `total` raw variables
    pub fn prop_positive(&self, total: usize) -> f64 {
        proportion(self.count_positive, total)
    }

    /// Share of strictly negative values over `total` raw variables
    pub fn prop_negative(&self, total: usize) -> f64 {
        proportion(self.count_negative, total)
    }
}

fn proportion(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}
