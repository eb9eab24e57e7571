//! Scalar quality metrics over predicted vs. reference text.
//!
//! Every metric here is a pure function of its inputs. Per-example work is
//! parallelized with rayon; an empty example list scores 0.0.

use std::collections::HashMap;

use rayon::prelude::*;

use lt_types::{DataError, LatticeResult, Metric};

fn check_lengths(labels: &[String], predictions: &[String]) -> LatticeResult<()> {
    if labels.len() != predictions.len() {
        return Err(DataError::LengthMismatch {
            labels: labels.len(),
            predictions: predictions.len(),
        }
        .into());
    }
    Ok(())
}

// ---- Character n-gram F-score ----

/// Character n-gram F-beta score averaged over n-gram orders and examples.
/// Whitespace is ignored, so tokenization differences between backends do
/// not move the score. The default (orders 1..=6, beta 2) is the sweep
/// default for chat tasks.
#[derive(Debug, Clone)]
pub struct ChrF {
    pub max_order: usize,
    pub beta: f64,
}

impl Default for ChrF {
    fn default() -> Self {
        Self {
            max_order: 6,
            beta: 2.0,
        }
    }
}

fn ngram_counts(chars: &[char], order: usize) -> HashMap<&[char], usize> {
    let mut counts: HashMap<&[char], usize> = HashMap::new();
    if chars.len() >= order {
        for gram in chars.windows(order) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

impl ChrF {
    /// Score one (label, prediction) pair. Two empty strings score 1.0.
    fn score_pair(&self, label: &str, prediction: &str) -> f64 {
        let label: Vec<char> = label.chars().filter(|c| !c.is_whitespace()).collect();
        let prediction: Vec<char> = prediction.chars().filter(|c| !c.is_whitespace()).collect();

        let beta_sq = self.beta * self.beta;
        let mut total = 0.0;
        let mut orders = 0usize;
        for order in 1..=self.max_order {
            let label_grams = ngram_counts(&label, order);
            let prediction_grams = ngram_counts(&prediction, order);
            if label_grams.is_empty() && prediction_grams.is_empty() {
                continue;
            }
            orders += 1;

            let overlap: usize = label_grams
                .iter()
                .filter_map(|(gram, count)| prediction_grams.get(gram).map(|c| count.min(c)))
                .sum();
            let label_total: usize = label_grams.values().sum();
            let prediction_total: usize = prediction_grams.values().sum();

            let precision = if prediction_total > 0 {
                overlap as f64 / prediction_total as f64
            } else {
                0.0
            };
            let recall = if label_total > 0 {
                overlap as f64 / label_total as f64
            } else {
                0.0
            };
            if precision + recall > 0.0 {
                total += (1.0 + beta_sq) * precision * recall / (beta_sq * precision + recall);
            }
        }

        if orders == 0 {
            1.0
        } else {
            total / orders as f64
        }
    }
}

impl Metric for ChrF {
    fn name(&self) -> &str {
        "chrf"
    }

    fn score(
        &self,
        _contexts: &[String],
        labels: &[String],
        predictions: &[String],
    ) -> LatticeResult<f64> {
        check_lengths(labels, predictions)?;
        if labels.is_empty() {
            return Ok(0.0);
        }
        let total: f64 = labels
            .par_iter()
            .zip(predictions.par_iter())
            .map(|(label, prediction)| self.score_pair(label, prediction))
            .sum();
        Ok(total / labels.len() as f64)
    }
}

// ---- Exact match ----

/// Fraction of predictions that equal their label after trimming.
#[derive(Debug, Clone, Default)]
pub struct ExactMatch;

impl Metric for ExactMatch {
    fn name(&self) -> &str {
        "exact_match"
    }

    fn score(
        &self,
        _contexts: &[String],
        labels: &[String],
        predictions: &[String],
    ) -> LatticeResult<f64> {
        check_lengths(labels, predictions)?;
        if labels.is_empty() {
            return Ok(0.0);
        }
        let hits = labels
            .par_iter()
            .zip(predictions.par_iter())
            .filter(|(label, prediction)| label.trim() == prediction.trim())
            .count();
        Ok(hits as f64 / labels.len() as f64)
    }
}

// ---- Length ratio ----

/// Mean per-example ratio of prediction length to label length, in
/// characters. Useful for spotting truncation or runaway generation.
/// A pair with an empty label scores 1.0 if the prediction is empty too,
/// otherwise 0.0.
#[derive(Debug, Clone, Default)]
pub struct LengthRatio;

impl Metric for LengthRatio {
    fn name(&self) -> &str {
        "length_ratio"
    }

    fn score(
        &self,
        _contexts: &[String],
        labels: &[String],
        predictions: &[String],
    ) -> LatticeResult<f64> {
        check_lengths(labels, predictions)?;
        if labels.is_empty() {
            return Ok(0.0);
        }
        let total: f64 = labels
            .par_iter()
            .zip(predictions.par_iter())
            .map(|(label, prediction)| {
                let label_len = label.chars().count();
                let prediction_len = prediction.chars().count();
                if label_len > 0 {
                    prediction_len as f64 / label_len as f64
                } else if prediction_len == 0 {
                    1.0
                } else {
                    0.0
                }
            })
            .sum();
        Ok(total / labels.len() as f64)
    }
}

// ---- Word error rate ----

/// Corpus-level word error rate: total word-level edit distance divided by
/// total reference words. The transcription default. Lower is better; the
/// score can exceed 1.0 when predictions are much longer than references.
#[derive(Debug, Clone, Default)]
pub struct WordErrorRate;

fn word_edit_distance(label: &[&str], prediction: &[&str]) -> usize {
    // Two-row Levenshtein over words
    let mut previous: Vec<usize> = (0..=prediction.len()).collect();
    let mut current = vec![0usize; prediction.len() + 1];
    for (i, label_word) in label.iter().enumerate() {
        current[0] = i + 1;
        for (j, prediction_word) in prediction.iter().enumerate() {
            let substitution = previous[j] + usize::from(label_word != prediction_word);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[prediction.len()]
}

impl Metric for WordErrorRate {
    fn name(&self) -> &str {
        "wer"
    }

    fn score(
        &self,
        _contexts: &[String],
        labels: &[String],
        predictions: &[String],
    ) -> LatticeResult<f64> {
        check_lengths(labels, predictions)?;
        let (edits, words) = labels
            .par_iter()
            .zip(predictions.par_iter())
            .map(|(label, prediction)| {
                let label_words: Vec<&str> = label.split_whitespace().collect();
                let prediction_words: Vec<&str> = prediction.split_whitespace().collect();
                (
                    word_edit_distance(&label_words, &prediction_words),
                    label_words.len(),
                )
            })
            .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

        if words == 0 {
            return Ok(if edits == 0 { 0.0 } else { 1.0 });
        }
        Ok(edits as f64 / words as f64)
    }
}
