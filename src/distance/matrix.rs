//! Dense centers × points distance matrix

/// Row-major matrix indexed `[center][point]`
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    n_centers: usize,
    n_points: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    pub fn zeros(n_centers: usize, n_points: usize) -> Self {
        Self {
            n_centers,
            n_points,
            data: vec![0.0; n_centers * n_points],
        }
    }

    /// Build from one row per center
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let n_centers = rows.len();
        let n_points = rows.first().map_or(0, Vec::len);
        debug_assert!(rows.iter().all(|r| r.len() == n_points));
        Self {
            n_centers,
            n_points,
            data: rows.into_iter().flatten().collect(),
        }
    }

    #[inline]
    pub fn n_centers(&self) -> usize {
        self.n_centers
    }

    #[inline]
    pub fn n_points(&self) -> usize {
        self.n_points
    }

    #[inline]
    pub fn get(&self, center: usize, point: usize) -> f64 {
        self.data[center * self.n_points + point]
    }

    #[inline]
    pub fn set(&mut self, center: usize, point: usize, value: f64) {
        self.data[center * self.n_points + point] = value;
    }

    /// Distances from one center to every point
    pub fn row(&self, center: usize) -> &[f64] {
        let start = center * self.n_points;
        &self.data[start..start + self.n_points]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.n_centers).map(move |c| self.row(c))
    }

    /// Index of the nearest center for every point. Ties go to the lowest
    /// center index.
    pub fn nearest_centers(&self) -> Vec<usize> {
        (0..self.n_points)
            .map(|p| {
                let mut best = 0;
                for c in 1..self.n_centers {
                    if self.get(c, p) < self.get(best, p) {
                        best = c;
                    }
                }
                best
            })
            .collect()
    }

    /// Smallest distance per point over all centers
    pub fn column_min(&self) -> Vec<f64> {
        (0..self.n_points)
            .map(|p| {
                (0..self.n_centers)
                    .map(|c| self.get(c, p))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect()
    }
}
