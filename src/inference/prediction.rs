//! Prediction results returned by the inference engine

use std::time::Duration;

use serde::Serialize;

/// A single (label, score) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
    /// Output index of the label, used for tie-breaking
    #[serde(skip)]
    pub index: usize,
}

/// Ranked predictions for one image
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    /// Sorted by descending score; equal scores keep the lower index first
    pub predictions: Vec<Prediction>,
    /// Time spent in the forward pass
    pub inference_time: Duration,
}

impl PredictionResult {
    /// Rank raw model scores against the label vocabulary.
    ///
    /// `top_k == 0` keeps every class.
    pub fn from_scores(
        scores: &[f32],
        labels: &[String],
        top_k: usize,
        inference_time: Duration,
    ) -> Self {
        let mut predictions: Vec<Prediction> = scores
            .iter()
            .zip(labels)
            .enumerate()
            .map(|(index, (&score, label))| Prediction {
                label: label.clone(),
                score,
                index,
            })
            .collect();

        predictions.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
        if top_k > 0 {
            predictions.truncate(top_k);
        }

        Self {
            predictions,
            inference_time,
        }
    }

    /// Highest-scoring prediction
    pub fn top(&self) -> Option<&Prediction> {
        self.predictions.first()
    }

    pub fn inference_time_ms(&self) -> f64 {
        self.inference_time.as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class_{}", i)).collect()
    }

    #[test]
    fn test_sorted_descending() {
        let result = PredictionResult::from_scores(&[0.1, 0.6, 0.3], &labels(3), 0, Duration::ZERO);
        let order: Vec<usize> = result.predictions.iter().map(|p| p.index).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert_eq!(result.top().unwrap().label, "class_1");
    }

    #[test]
    fn test_ties_keep_lower_index_first() {
        let result =
            PredictionResult::from_scores(&[0.25, 0.25, 0.25, 0.25], &labels(4), 0, Duration::ZERO);
        let order: Vec<usize> = result.predictions.iter().map(|p| p.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);

        let result = PredictionResult::from_scores(&[0.2, 0.4, 0.4], &labels(3), 0, Duration::ZERO);
        let order: Vec<usize> = result.predictions.iter().map(|p| p.index).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_top_k_truncates() {
        let result =
            PredictionResult::from_scores(&[0.1, 0.2, 0.3, 0.4], &labels(4), 2, Duration::ZERO);
        assert_eq!(result.predictions.len(), 2);
        assert_eq!(result.predictions[0].label, "class_3");
        assert_eq!(result.predictions[1].label, "class_2");

        let all = PredictionResult::from_scores(&[0.1, 0.2], &labels(2), 10, Duration::ZERO);
        assert_eq!(all.predictions.len(), 2);
    }

    #[test]
    fn test_serializes_label_and_score_only() {
        let result = PredictionResult::from_scores(&[0.5], &labels(1), 0, Duration::ZERO);
        let json = serde_json::to_value(&result.predictions).unwrap();
        assert_eq!(json, serde_json::json!([{"label": "class_0", "score": 0.5}]));
    }

    #[test]
    fn test_inference_time_ms() {
        let result = PredictionResult::from_scores(&[], &[], 0, Duration::from_micros(1500));
        assert!(result.predictions.is_empty());
        assert!((result.inference_time_ms() - 1.5).abs() < 1e-9);
    }
}
