//! Job batching for (point, center) swap tests
//!
//! The dataset is cut into contiguous chunks of at most `max_batch_size`
//! rows. Every chunk is paired with every center, chunk-major and
//! center-minor, so the flat stream of per-circuit results is laid out as
//!
//! ```text
//! chunk 0: center 0 [p0 .. pm), center 1 [p0 .. pm), ...
//! chunk 1: center 0 [pm .. p2m), center 1 [pm .. p2m), ...
//! ```
//!
//! [`flat_index`] gives the position of a (center, point) pair in that stream
//! and [`collect_results`] inverts it.

use crate::distance::DistanceMatrix;
use crate::error::{QKMeansError, Result};

/// One job's worth of swap tests: a run of rows against a single center
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub chunk: usize,
    pub center_index: usize,
    /// Row index of `points[0]` in the dataset
    pub offset: usize,
    pub points: &'a [Vec<f64>],
    pub center: &'a [f64],
}

impl Batch<'_> {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[inline]
pub fn num_chunks(n_points: usize, max_batch_size: usize) -> usize {
    n_points.div_ceil(max_batch_size)
}

/// Split `dataset` × `centers` into batches of at most `max_batch_size`
/// circuits.
///
/// Only the `len(dataset) > len(centers)` shape is supported.
pub fn make_batches<'a>(
    dataset: &'a [Vec<f64>],
    centers: &'a [Vec<f64>],
    max_batch_size: usize,
) -> Result<Vec<Batch<'a>>> {
    check_shape(dataset.len(), centers.len(), max_batch_size)?;

    let mut batches = Vec::with_capacity(num_chunks(dataset.len(), max_batch_size) * centers.len());
    for (chunk, points) in dataset.chunks(max_batch_size).enumerate() {
        for (center_index, center) in centers.iter().enumerate() {
            batches.push(Batch {
                chunk,
                center_index,
                offset: chunk * max_batch_size,
                points,
                center,
            });
        }
    }
    Ok(batches)
}

/// Position of the (center, point) result in the flattened batch stream
pub fn flat_index(
    center: usize,
    point: usize,
    n_centers: usize,
    n_points: usize,
    max_batch_size: usize,
) -> usize {
    let chunk_start = point / max_batch_size * max_batch_size;
    let chunk_len = max_batch_size.min(n_points - chunk_start);
    chunk_start * n_centers + center * chunk_len + (point - chunk_start)
}

/// Reassemble the flat per-circuit results of [`make_batches`] into a
/// centers × points matrix
pub fn collect_results(
    flat: &[f64],
    n_centers: usize,
    n_points: usize,
    max_batch_size: usize,
) -> Result<DistanceMatrix> {
    if max_batch_size == 0 {
        return Err(QKMeansError::InvalidConfig("max_batch_size must be positive".into()));
    }
    let expected = n_centers * n_points;
    if flat.len() != expected {
        return Err(QKMeansError::ResultCountMismatch {
            expected,
            got: flat.len(),
        });
    }

    let mut matrix = DistanceMatrix::zeros(n_centers, n_points);
    let mut cursor = 0;
    for chunk_start in (0..n_points).step_by(max_batch_size) {
        let chunk_end = (chunk_start + max_batch_size).min(n_points);
        for center in 0..n_centers {
            for point in chunk_start..chunk_end {
                matrix.set(center, point, flat[cursor]);
                cursor += 1;
            }
        }
    }
    Ok(matrix)
}

fn check_shape(n_points: usize, n_centers: usize, max_batch_size: usize) -> Result<()> {
    if max_batch_size == 0 {
        return Err(QKMeansError::InvalidConfig("max_batch_size must be positive".into()));
    }
    if n_points == 0 {
        return Err(QKMeansError::EmptyDataset);
    }
    if n_centers == 0 {
        return Err(QKMeansError::InvalidConfig("no centers to compare against".into()));
    }
    if n_points <= n_centers {
        return Err(QKMeansError::UnsupportedShape {
            points: n_points,
            centers: n_centers,
        });
    }
    Ok(())
}
