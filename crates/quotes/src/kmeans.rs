//! Seeded k-means over an embedding matrix
//!
//! 1. Seed k centroids with k-means++ drawn from the caller's RNG
//! 2. Assign every row to its nearest centroid (lowest index on ties)
//! 3. Recompute centroids; an emptied cluster takes the row farthest from its own centroid
//! 4. Stop when no centroid moves more than the tolerance, or at the iteration cap
//!
//! Given the same matrix and the same RNG state the result is identical.

use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView1, Axis};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeans {
  pub k: usize,
  pub max_iterations: usize,
  pub tolerance: f32,
}

#[derive(Debug, Clone)]
pub struct Clustering {
  /// Cluster index per input row
  pub labels: Vec<usize>,
  pub centroids: Array2<f32>,
  pub iterations: usize,
  pub converged: bool,
}

impl Clustering {
  /// Row indices per cluster, empty clusters included
  pub fn members(&self) -> Vec<Vec<usize>> {
    let mut members = vec![Vec::new(); self.centroids.nrows()];
    for (row, &label) in self.labels.iter().enumerate() {
      members[label].push(row);
    }
    members
  }
}

fn squared_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
  a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn assign(data: &Array2<f32>, centroids: &Array2<f32>) -> Vec<usize> {
  data
    .outer_iter()
    .map(|row| {
      let mut best = 0;
      let mut best_distance = f32::INFINITY;
      for (index, centroid) in centroids.outer_iter().enumerate() {
        let distance = squared_distance(row, centroid);
        if distance < best_distance {
          best = index;
          best_distance = distance;
        }
      }
      best
    })
    .collect()
}

/// Mean of each cluster's rows; empty clusters are re-seeded
fn recompute(data: &Array2<f32>, labels: &[usize], k: usize) -> Array2<f32> {
  let mut centroids = Array2::<f32>::zeros((k, data.ncols()));
  let mut counts = vec![0usize; k];

  for (row, &label) in data.outer_iter().zip(labels) {
    let mut sum = centroids.row_mut(label);
    sum += &row;
    counts[label] += 1;
  }
  for (mut centroid, &count) in centroids.outer_iter_mut().zip(&counts) {
    if count > 0 {
      let count = count as f32;
      centroid.mapv_inplace(|value| value / count);
    }
  }

  let empty: Vec<usize> = (0..k).filter(|&cluster| counts[cluster] == 0).collect();
  if empty.is_empty() {
    return centroids;
  }

  let mut spread: Vec<(usize, f32)> = data
    .outer_iter()
    .zip(labels)
    .enumerate()
    .map(|(index, (row, &label))| (index, squared_distance(row, centroids.row(label))))
    .collect();
  // Farthest first; equal distances keep row order
  spread.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

  for (cluster, (index, _)) in empty.into_iter().zip(spread) {
    centroids.row_mut(cluster).assign(&data.row(index));
  }
  centroids
}

fn max_shift(before: &Array2<f32>, after: &Array2<f32>) -> f32 {
  before
    .outer_iter()
    .zip(after.outer_iter())
    .map(|(old, new)| squared_distance(old, new).sqrt())
    .fold(0.0f32, f32::max)
}

impl KMeans {
  pub fn new(k: usize, max_iterations: usize, tolerance: f32) -> Result<Self> {
    if k == 0 {
      bail!("k must be > 0");
    }
    if max_iterations == 0 {
      bail!("max_iterations must be > 0");
    }
    if !tolerance.is_finite() || tolerance < 0.0 {
      bail!("tolerance must be a finite non-negative number");
    }
    Ok(Self { k, max_iterations, tolerance })
  }

  /// k-means++: each next seed is drawn with probability proportional to its
  /// squared distance from the nearest seed so far
  fn seed<R: Rng + ?Sized>(&self, data: &Array2<f32>, rng: &mut R) -> Array2<f32> {
    let n = data.nrows();
    let first = rng.random_range(0..n);
    let mut chosen = vec![first];
    let mut nearest: Vec<f32> =
      data.outer_iter().map(|row| squared_distance(row, data.row(first))).collect();

    while chosen.len() < self.k {
      let total: f64 = nearest.iter().map(|&d| f64::from(d)).sum();
      let next = if total > 0.0 {
        let mut target = rng.random::<f64>() * total;
        let mut pick = nearest.iter().rposition(|&d| d > 0.0).unwrap_or(n - 1);
        for (index, &distance) in nearest.iter().enumerate() {
          if distance <= 0.0 {
            continue;
          }
          target -= f64::from(distance);
          if target < 0.0 {
            pick = index;
            break;
          }
        }
        pick
      } else {
        // Every row coincides with a seed
        rng.random_range(0..n)
      };

      chosen.push(next);
      for (distance, row) in nearest.iter_mut().zip(data.outer_iter()) {
        *distance = distance.min(squared_distance(row, data.row(next)));
      }
    }

    data.select(Axis(0), &chosen)
  }

  pub fn fit<R: Rng + ?Sized>(&self, data: &Array2<f32>, rng: &mut R) -> Result<Clustering> {
    let n = data.nrows();
    if n == 0 {
      bail!("cannot cluster an empty matrix");
    }
    if self.k > n {
      bail!("cannot form {} clusters from {} points", self.k, n);
    }

    let mut centroids = self.seed(data, rng);
    let mut labels = assign(data, &centroids);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < self.max_iterations {
      iterations += 1;
      let updated = recompute(data, &labels, self.k);
      let shift = max_shift(&centroids, &updated);
      centroids = updated;
      labels = assign(data, &centroids);

      if shift <= self.tolerance {
        converged = true;
        break;
      }
    }

    if !converged {
      bentley::verbose!(&format!("k-means stopped at the {iterations} iteration cap"));
    }

    Ok(Clustering { labels, centroids, iterations, converged })
  }
}
