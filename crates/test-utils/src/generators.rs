//! Deterministic generators for synthetic observations.
//!
//! Generators return plain coordinates and values so that any crate in the
//! workspace can build its own observation type from them.

/// Evenly spaced `(lat, lon)` points covering a bounding box.
///
/// Points sit at the centers of an `n_lat x n_lon` lattice laid over
/// `(min_lon, min_lat, max_lon, max_lat)`, north to south and west to east.
///
/// # Example
///
/// ```
/// use test_utils::lattice_points;
///
/// let points = lattice_points((0.0, 0.0, 10.0, 10.0), 2, 2);
/// assert_eq!(points, vec![(7.5, 2.5), (7.5, 7.5), (2.5, 2.5), (2.5, 7.5)]);
/// ```
pub fn lattice_points(
    bbox: (f64, f64, f64, f64),
    n_lat: usize,
    n_lon: usize,
) -> Vec<(f64, f64)> {
    let (min_lon, min_lat, max_lon, max_lat) = bbox;
    let dlat = (max_lat - min_lat) / n_lat.max(1) as f64;
    let dlon = (max_lon - min_lon) / n_lon.max(1) as f64;
    let mut points = Vec::with_capacity(n_lat * n_lon);
    for i in 0..n_lat {
        for j in 0..n_lon {
            points.push((
                max_lat - (i as f64 + 0.5) * dlat,
                min_lon + (j as f64 + 0.5) * dlon,
            ));
        }
    }
    points
}

/// Small linear congruential generator for reproducible pseudo-random data.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x5DEE_CE66_D,
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.state >> 11
    }

    /// Uniform value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.next_u64() as f64 / (1u64 << 53) as f64
    }

    /// Uniform value in `[lo, hi)`.
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// `n` random `(lat, lon)` points inside a bounding box.
pub fn random_points(bbox: (f64, f64, f64, f64), n: usize, seed: u64) -> Vec<(f64, f64)> {
    let (min_lon, min_lat, max_lon, max_lat) = bbox;
    let mut rng = Lcg::new(seed);
    (0..n)
        .map(|_| (rng.uniform(min_lat, max_lat), rng.uniform(min_lon, max_lon)))
        .collect()
}

/// `n` random values in `[lo, hi)`.
pub fn random_values(n: usize, lo: f32, hi: f32, seed: u64) -> Vec<f32> {
    let mut rng = Lcg::new(seed);
    (0..n).map(|_| rng.uniform(lo as f64, hi as f64) as f32).collect()
}

/// Fisher-Yates shuffle driven by [`Lcg`].
pub fn shuffled<T: Clone>(items: &[T], seed: u64) -> Vec<T> {
    let mut out = items.to_vec();
    let mut rng = Lcg::new(seed);
    for i in (1..out.len()).rev() {
        let j = (rng.next_u64() % (i as u64 + 1)) as usize;
        out.swap(i, j);
    }
    out
}

/// Deal `items` round-robin into `parts` partitions.
pub fn partition<T: Clone>(items: &[T], parts: usize) -> Vec<Vec<T>> {
    let parts = parts.max(1);
    let mut out = vec![Vec::new(); parts];
    for (i, item) in items.iter().enumerate() {
        out[i % parts].push(item.clone());
    }
    out
}
