//! Vector similarity
//!
//! Every metric is oriented so that a larger score means "more alike". Vectors
//! of different lengths never compare as similar; the stores reject them long
//! before they reach a metric.

use serde::{Deserialize, Serialize};

/// How two embeddings are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Angle between the vectors, in [-1, 1]
    #[default]
    Cosine,
    /// Raw inner product; equals cosine for unit vectors
    DotProduct,
    /// `1 / (1 + distance)`, in (0, 1]
    Euclidean,
}

impl SimilarityMetric {
    /// Score `a` against `b`
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return f32::NEG_INFINITY;
        }

        match self {
            Self::Cosine => {
                let (dot, aa, bb) = a.iter().zip(b).fold((0.0f32, 0.0f32, 0.0f32), |acc, (x, y)| {
                    (acc.0 + x * y, acc.1 + x * x, acc.2 + y * y)
                });
                if aa == 0.0 || bb == 0.0 {
                    0.0
                } else {
                    dot / (aa.sqrt() * bb.sqrt())
                }
            }
            Self::DotProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Self::Euclidean => {
                let squared: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
                1.0 / (1.0 + squared.sqrt())
            }
        }
    }
}

/// Scale `v` to unit length; the zero vector is left alone
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_cosine() {
        let m = SimilarityMetric::Cosine;
        assert!((m.score(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < EPS);
        assert!(m.score(&[1.0, 0.0], &[0.0, 3.0]).abs() < EPS);
        assert!((m.score(&[1.0, 0.0], &[0.9, 0.1]) - 0.993_883_7).abs() < EPS);
        assert_eq!(m.score(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_dot_product() {
        let m = SimilarityMetric::DotProduct;
        assert!((m.score(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]) - 32.0).abs() < EPS);
    }

    #[test]
    fn test_euclidean() {
        let m = SimilarityMetric::Euclidean;
        assert!((m.score(&[0.0, 0.0], &[3.0, 4.0]) - 1.0 / 6.0).abs() < EPS);
        assert!((m.score(&[1.0, 1.0], &[1.0, 1.0]) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_length_mismatch_is_never_similar() {
        for m in [SimilarityMetric::Cosine, SimilarityMetric::DotProduct, SimilarityMetric::Euclidean] {
            assert_eq!(m.score(&[1.0], &[1.0, 0.0]), f32::NEG_INFINITY);
        }
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < EPS && (v[1] - 0.8).abs() < EPS);

        let mut zero = vec![0.0; 3];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 3]);
    }

    #[test]
    fn test_metric_serde_names() {
        assert_eq!(
            serde_json::to_string(&SimilarityMetric::DotProduct).unwrap(),
            "\"dot_product\""
        );
    }
}
