//! Summary of externally produced binary predictions.

use crate::error::{BeatError, BeatResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 2x2 confusion matrix, rows are the actual class and columns the prediction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    pub fn proportion_correct(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            n => (self.true_negative + self.true_positive) as f64 / n as f64,
        }
    }

    /// True positive rate; 0 when there are no actual positives.
    pub fn sensitivity(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    /// True negative rate; 0 when there are no actual negatives.
    pub fn specificity(&self) -> f64 {
        ratio(self.true_negative, self.true_negative + self.false_positive)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>10} {:>10} {:>10}", "", "Predict 0", "Predict 1")?;
        writeln!(
            f,
            "{:>10} {:>10} {:>10}",
            "Actual 0", self.true_negative, self.false_positive
        )?;
        write!(
            f,
            "{:>10} {:>10} {:>10}",
            "Actual 1", self.false_negative, self.true_positive
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub confusion: ConfusionMatrix,
    pub proportion_correct: f64,
    pub sensitivity: f64,
    pub specificity: f64,
}

/// Confusion matrix and proportion correct for 0/1 outcomes.
pub fn calc_results(y_true: &[u8], y_pred: &[u8]) -> BeatResult<EvaluationSummary> {
    if y_true.len() != y_pred.len() {
        return Err(BeatError::invalid(format!(
            "{} true outcomes but {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(BeatError::invalid("no outcomes to evaluate"));
    }

    let mut cm = ConfusionMatrix::default();
    for (pos, (&actual, &predicted)) in y_true.iter().zip(y_pred).enumerate() {
        match (actual, predicted) {
            (0, 0) => cm.true_negative += 1,
            (0, 1) => cm.false_positive += 1,
            (1, 0) => cm.false_negative += 1,
            (1, 1) => cm.true_positive += 1,
            _ => {
                return Err(BeatError::invalid(format!(
                    "outcomes must be 0 or 1, got ({}, {}) at position {}",
                    actual, predicted, pos
                )))
            }
        }
    }

    Ok(EvaluationSummary {
        confusion: cm,
        proportion_correct: cm.proportion_correct(),
        sensitivity: cm.sensitivity(),
        specificity: cm.specificity(),
    })
}
