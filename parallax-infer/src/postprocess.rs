//! Postprocessing: logits to ranked, human-readable predictions.

use crate::error::{AssetError, Result, RunError};
use ndarray::ArrayD;
use std::path::Path;

/// One ranked prediction.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub label: String,
    pub score: f32,
}

/// Class-index to label mapping, one label per line.
#[derive(Clone, Debug, Default)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    /// Table with no labels; every index falls back to a synthetic name.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_lines(text: &str) -> Self {
        Self {
            labels: text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(AssetError::from)?;
        Ok(Self::from_lines(&text))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label for a class index, or `class_{idx}` when unmapped.
    pub fn label(&self, index: usize) -> String {
        match self.labels.get(index) {
            Some(label) => label.clone(),
            None => format!("class_{index}"),
        }
    }
}

/// Numerically stable softmax over a flat score vector.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|&e| e / sum).collect()
}

/// Indices of the `k` largest scores, descending by score.
///
/// Ties break toward the lower index so rankings are deterministic.
pub fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    order.truncate(k);
    order
}

/// Rank a logits tensor into the top `k` labeled predictions.
///
/// The tensor is treated as a flat score vector regardless of its batch
/// shape; scores are passed through softmax before ranking.
pub fn rank(logits: &ArrayD<f32>, labels: &LabelTable, k: usize) -> Result<Vec<Prediction>> {
    let scores: Vec<f32> = match logits.as_slice() {
        Some(slice) => slice.to_vec(),
        None => logits.iter().copied().collect(),
    };
    if scores.is_empty() {
        return Err(RunError::MissingOutput {
            name: "logits".to_string(),
        }
        .into());
    }

    let probs = softmax(&scores);
    Ok(top_k(&probs, k)
        .into_iter()
        .map(|index| Prediction {
            index,
            label: labels.label(index),
            score: probs[index],
        })
        .collect())
}

/// Fraction of shared indices between two top-K rankings, order-insensitive.
pub fn ranking_agreement(a: &[Prediction], b: &[Prediction]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a
        .iter()
        .filter(|p| b.iter().any(|q| q.index == p.index))
        .count();
    shared as f64 / a.len().max(b.len()) as f64
}

/// Clamp a float waveform to [-1, 1] and scale to i16 PCM.
pub fn waveform_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn softmax_sums_to_one_and_is_stable() {
        let probs = softmax(&[1000.0, 1001.0, 1002.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn top_k_is_descending_with_stable_ties() {
        let order = top_k(&[0.1, 0.5, 0.5, 0.3], 3);
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn top_k_clamps_to_available_scores() {
        assert_eq!(top_k(&[0.2, 0.8], 5), vec![1, 0]);
    }

    #[test]
    fn rank_labels_known_and_unknown_indices() {
        let labels = LabelTable::from_lines("cat\ndog\n");
        let logits = Array1::from_vec(vec![0.0, 3.0, 5.0]).into_dyn();

        let ranked = rank(&logits, &labels, 2).unwrap();

        assert_eq!(ranked[0].index, 2);
        assert_eq!(ranked[0].label, "class_2");
        assert_eq!(ranked[1].label, "dog");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn rank_rejects_empty_logits() {
        let logits = Array1::<f32>::from_vec(vec![]).into_dyn();
        assert!(rank(&logits, &LabelTable::empty(), 3).is_err());
    }

    #[test]
    fn agreement_counts_shared_indices() {
        let mk = |indices: &[usize]| -> Vec<Prediction> {
            indices
                .iter()
                .map(|&index| Prediction {
                    index,
                    label: format!("class_{index}"),
                    score: 0.0,
                })
                .collect()
        };

        assert_eq!(ranking_agreement(&mk(&[1, 2, 3]), &mk(&[3, 2, 1])), 1.0);
        assert_eq!(ranking_agreement(&mk(&[1, 2, 3, 4]), &mk(&[1, 2, 5, 6])), 0.5);
        assert_eq!(ranking_agreement(&mk(&[]), &mk(&[1])), 0.0);
    }

    #[test]
    fn label_table_skips_blank_lines() {
        let labels = LabelTable::from_lines("a\n\n  b  \n");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.label(1), "b");
    }

    #[test]
    fn waveform_clamps_out_of_range_samples() {
        let pcm = waveform_to_i16(&[0.0, 2.0, -2.0]);
        assert_eq!(pcm, vec![0, i16::MAX, -i16::MAX]);
    }
}
