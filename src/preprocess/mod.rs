//! Feature preprocessing ahead of quantum encoding
//!
//! Angle encoding works on standardized features; probability encoding needs
//! unit-norm rows so each row is a valid amplitude vector.

use crate::encoding::EncodingScheme;
use crate::error::{QKMeansError, Result};

/// Euclidean norm
#[inline]
pub fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Check the dataset is non-empty and rectangular, returning its width
pub fn dimension_of(points: &[Vec<f64>]) -> Result<usize> {
    let first = points.first().ok_or(QKMeansError::EmptyDataset)?;
    let dim = first.len();
    for row in points {
        if row.len() != dim {
            return Err(QKMeansError::DimensionMismatch {
                expected: dim,
                got: row.len(),
            });
        }
    }
    Ok(dim)
}

/// Prepare `points` for the given encoding
pub fn preprocess(points: &[Vec<f64>], scheme: &EncodingScheme) -> Result<Vec<Vec<f64>>> {
    let dim = dimension_of(points)?;

    match scheme {
        EncodingScheme::Angle { norm_relevance, .. } => {
            let mut scaled = standardize(points, dim);
            if *norm_relevance {
                if dim != 2 {
                    return Err(QKMeansError::UnsupportedEncoding(format!(
                        "norm_relevance needs exactly 2 features, got {dim}"
                    )));
                }
                append_relative_norm(&mut scaled);
            }
            Ok(scaled)
        }
        EncodingScheme::Probability => Ok(normalize_rows(points)),
    }
}

/// Zero mean and unit (population) variance per feature.
/// Constant features are centered only.
pub fn standardize(points: &[Vec<f64>], dim: usize) -> Vec<Vec<f64>> {
    let n = points.len() as f64;
    let mut mean = vec![0.0; dim];
    for row in points {
        for (m, &x) in mean.iter_mut().zip(row) {
            *m += x;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let mut std = vec![0.0; dim];
    for row in points {
        for ((s, &x), &m) in std.iter_mut().zip(row).zip(&mean) {
            *s += (x - m) * (x - m);
        }
    }
    for s in std.iter_mut() {
        *s = (*s / n).sqrt();
        if *s == 0.0 {
            *s = 1.0;
        }
    }

    points
        .iter()
        .map(|row| {
            row.iter()
                .zip(&mean)
                .zip(&std)
                .map(|((&x, &m), &s)| (x - m) / s)
                .collect()
        })
        .collect()
}

/// Append `|row[..2]| / max_row |row[..2]|` as a third column
fn append_relative_norm(points: &mut [Vec<f64>]) {
    let norms: Vec<f64> = points.iter().map(|p| l2_norm(&p[..2])).collect();
    let max_norm = norms.iter().copied().fold(0.0_f64, f64::max);

    for (row, norm) in points.iter_mut().zip(norms) {
        row.push(if max_norm > 0.0 { norm / max_norm } else { 0.0 });
    }
}

/// Scale every row to unit L2 norm. Zero rows are left untouched.
pub fn normalize_rows(points: &[Vec<f64>]) -> Vec<Vec<f64>> {
    points.iter().map(|row| normalize(row)).collect()
}

/// Unit-norm copy of `v`, or `v` itself when its norm is zero
pub fn normalize(v: &[f64]) -> Vec<f64> {
    let norm = l2_norm(v);
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::MagnitudeScale;

    fn angle(norm_relevance: bool) -> EncodingScheme {
        EncodingScheme::Angle {
            norm_relevance,
            magnitude_scale: MagnitudeScale::Half,
        }
    }

    #[test]
    fn test_standardize_zero_mean_unit_variance() {
        let points = vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]];
        let out = preprocess(&points, &angle(false)).unwrap();

        for j in 0..2 {
            let mean: f64 = out.iter().map(|r| r[j]).sum::<f64>() / 3.0;
            let var: f64 = out.iter().map(|r| r[j] * r[j]).sum::<f64>() / 3.0;
            assert!(mean.abs() < 1e-12);
            assert!((var - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_standardize_constant_feature() {
        let points = vec![vec![5.0, 1.0], vec![5.0, 3.0]];
        let out = standardize(&points, 2);
        assert_eq!(out[0][0], 0.0);
        assert_eq!(out[1][0], 0.0);
        assert!((out[0][1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_norm_relevance_column() {
        let points = vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 2.0]];
        let out = preprocess(&points, &angle(true)).unwrap();

        assert!(out.iter().all(|r| r.len() == 3));
        let col: Vec<f64> = out.iter().map(|r| r[2]).collect();
        // the middle row sits at the mean
        assert!(col[1].abs() < 1e-12);
        assert!((col[0] - 1.0).abs() < 1e-12);
        assert!((col[2] - 1.0).abs() < 1e-12);
        assert!(col.iter().all(|&c| (0.0..=1.0).contains(&c)));
    }

    #[test]
    fn test_norm_relevance_requires_two_features() {
        let points = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        assert!(matches!(
            preprocess(&points, &angle(true)),
            Err(QKMeansError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_probability_rows_are_unit() {
        let points = vec![vec![3.0, 4.0], vec![0.0, 2.0], vec![0.0, 0.0]];
        let out = preprocess(&points, &EncodingScheme::Probability).unwrap();

        assert!((l2_norm(&out[0]) - 1.0).abs() < 1e-12);
        assert_eq!(out[0], vec![0.6, 0.8]);
        assert_eq!(out[1], vec![0.0, 1.0]);
        assert_eq!(out[2], vec![0.0, 0.0]);
    }

    #[test]
    fn test_empty_and_ragged() {
        assert!(matches!(
            preprocess(&[], &EncodingScheme::Probability),
            Err(QKMeansError::EmptyDataset)
        ));
        let ragged = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(
            preprocess(&ragged, &EncodingScheme::Probability),
            Err(QKMeansError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }
}
