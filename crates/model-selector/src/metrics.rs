//! Ranking Metrics

use crate::SelectionError;

/// Area under the ROC curve.
///
/// Computed from the Mann-Whitney rank statistic; tied scores share their
/// average rank.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Result<f64, SelectionError> {
    if labels.len() != scores.len() {
        return Err(SelectionError::LengthMismatch {
            rows: scores.len(),
            labels: labels.len(),
        });
    }

    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(SelectionError::SingleClass);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }

        // ranks are 1-based; the tie group spans start+1 ..= end
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let positives = order[start..end].iter().filter(|&&i| labels[i]).count();
        rank_sum_pos += avg_rank * positives as f64;

        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Mean and population standard deviation
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Mean binary cross-entropy of probabilities against labels
pub fn log_loss(labels: &[bool], probabilities: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }

    let eps = 1e-15;
    let total: f64 = labels
        .iter()
        .zip(probabilities)
        .map(|(&y, &p)| {
            let p = p.clamp(eps, 1.0 - eps);
            if y {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / labels.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perfect_ranking() {
        let labels = [false, false, true, true];
        let scores = [0.1, 0.2, 0.8, 0.9];
        assert_relative_eq!(roc_auc(&labels, &scores).unwrap(), 1.0);
    }

    #[test]
    fn test_inverted_ranking() {
        let labels = [true, true, false, false];
        let scores = [0.1, 0.2, 0.8, 0.9];
        assert_relative_eq!(roc_auc(&labels, &scores).unwrap(), 0.0);
    }

    #[test]
    fn test_ties_count_half() {
        let labels = [false, true];
        let scores = [0.5, 0.5];
        assert_relative_eq!(roc_auc(&labels, &scores).unwrap(), 0.5);
    }

    #[test]
    fn test_known_value() {
        // pairs (pos, neg): (0.35 > 0.1), (0.35 < 0.4), (0.8 > 0.1), (0.8 > 0.4)
        let labels = [false, false, true, true];
        let scores = [0.1, 0.4, 0.35, 0.8];
        assert_relative_eq!(roc_auc(&labels, &scores).unwrap(), 0.75);
    }

    #[test]
    fn test_single_class_is_error() {
        assert_eq!(
            roc_auc(&[true, true], &[0.1, 0.2]),
            Err(SelectionError::SingleClass)
        );
    }

    #[test]
    fn test_mean_and_std() {
        let (mean, std) = mean_and_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_relative_eq!(mean, 5.0);
        assert_relative_eq!(std, 2.0);
    }

    #[test]
    fn test_log_loss_prefers_confident_correct() {
        let labels = [true, false];
        assert!(log_loss(&labels, &[0.9, 0.1]) < log_loss(&labels, &[0.6, 0.4]));
    }
}
