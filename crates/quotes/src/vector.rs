//! Embedding-space arithmetic shared by sampling and clustering

use anyhow::Result;
use ndarray::{Array2, Axis};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::QuotesError;

/// Euclidean (L2) distance; mismatched lengths compare only the shared prefix
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
  squared_euclidean_distance(a, b).sqrt()
}

/// Sum of squared differences, same ranking as `euclidean_distance` without the sqrt
pub fn squared_euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
  a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Element-wise mean of equally sized vectors, accumulated in input order
pub fn mean_vector(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
  let matrix = stack(vectors)?;
  let mean = matrix
    .mean_axis(Axis(0))
    .ok_or_else(|| QuotesError::invalid_config("cannot average zero vectors"))?;
  Ok(mean.to_vec())
}

/// Stack rows into an `n x d` matrix, rejecting ragged input
pub fn stack(vectors: &[Vec<f32>]) -> Result<Array2<f32>> {
  let dimension = vectors.first().map_or(0, Vec::len);
  let mut flat = Vec::with_capacity(vectors.len() * dimension);

  for vector in vectors {
    if vector.len() != dimension {
      let mismatch = QuotesError::DimensionMismatch { expected: dimension, actual: vector.len() };
      return Err(mismatch.into());
    }
    flat.extend_from_slice(vector);
  }

  Ok(Array2::from_shape_vec((vectors.len(), dimension), flat)?)
}

/// Probe vector with independent standard-normal components
pub fn gaussian_probe<R: Rng + ?Sized>(rng: &mut R, dimension: usize) -> Vec<f32> {
  (0..dimension).map(|_| -> f32 { StandardNormal.sample(&mut *rng) }).collect()
}
