//! Lightweight Tensor Operations
//!
//! Dense row-major storage for the small weight matrices and vectors of an
//! action-value network. Random initialisation always goes through a caller
//! supplied RNG so that two networks built from the same seed are identical.
#![allow(clippy::needless_range_loop)] // Tensor indexing

use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{ModelError, ModelResult};

/// A simple tensor type backed by a flat vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Flat data storage (row-major)
    pub data: Vec<f64>,
    /// Shape of the tensor
    pub shape: SmallVec<[usize; 4]>,
}

impl Tensor {
    /// Create a new tensor with given shape, initialized to zero
    pub fn zeros(shape: &[usize]) -> Self {
        let size = shape.iter().product();
        Self {
            data: vec![0.0; size],
            shape: SmallVec::from_slice(shape),
        }
    }

    /// Create a tensor from data and shape
    pub fn from_vec(data: Vec<f64>, shape: &[usize]) -> ModelResult<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(ModelError::DimensionMismatch {
                expected,
                got: data.len(),
            });
        }

        Ok(Self {
            data,
            shape: SmallVec::from_slice(shape),
        })
    }

    /// Create a 1D tensor from a slice
    pub fn from_slice(data: &[f64]) -> Self {
        Self {
            data: data.to_vec(),
            shape: SmallVec::from_slice(&[data.len()]),
        }
    }

    /// Uniform samples in `[min, max)`
    pub fn random_uniform<R: Rng + ?Sized>(shape: &[usize], min: f64, max: f64, rng: &mut R) -> Self {
        let size = shape.iter().product();
        let data = (0..size).map(|_| rng.random_range(min..max)).collect();
        Self {
            data,
            shape: SmallVec::from_slice(shape),
        }
    }

    /// Normal samples via Box-Muller
    pub fn random_normal<R: Rng + ?Sized>(shape: &[usize], mean: f64, std: f64, rng: &mut R) -> Self {
        let size = shape.iter().product();
        let data = (0..size)
            .map(|_| {
                // u1 must stay away from 0 for the logarithm
                let u1: f64 = rng.random_range(f64::EPSILON..1.0);
                let u2: f64 = rng.random();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                mean + std * z
            })
            .collect();

        Self {
            data,
            shape: SmallVec::from_slice(shape),
        }
    }

    /// He initialization for a `[out, in]` weight matrix feeding a ReLU
    pub fn he_init<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Self {
        if shape.len() < 2 {
            return Self::random_normal(shape, 0.0, 0.01, rng);
        }

        let fan_in = shape[1].max(1);
        let std = (2.0 / fan_in as f64).sqrt();
        Self::random_normal(shape, 0.0, std, rng)
    }

    /// Xavier/Glorot initialization for a `[out, in]` weight matrix
    pub fn xavier_init<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Self {
        if shape.len() < 2 {
            return Self::random_uniform(shape, -0.1, 0.1, rng);
        }

        let limit = (6.0 / (shape[0] + shape[1]).max(1) as f64).sqrt();
        Self::random_uniform(shape, -limit, limit, rng)
    }

    /// Get total number of elements
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get shape
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Apply function element-wise
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        Self {
            data: self.data.iter().map(|&x| f(x)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// True if any element is NaN or infinite
    pub fn has_non_finite(&self) -> bool {
        self.data.iter().any(|x| !x.is_finite())
    }

    /// In-place `self += other`
    pub fn add_assign(&mut self, other: &Self) -> ModelResult<()> {
        self.check_same_size(other)?;
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        Ok(())
    }

    /// In-place `self = tau * other + (1 - tau) * self`
    pub fn lerp_towards(&mut self, other: &Self, tau: f64) -> ModelResult<()> {
        self.check_same_size(other)?;
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a = tau * b + (1.0 - tau) * *a;
        }
        Ok(())
    }

    /// Outer product `a ⊗ b` as an `[a.len(), b.len()]` matrix
    pub fn outer(a: &Self, b: &Self) -> Self {
        let rows = a.data.len();
        let cols = b.data.len();
        let mut data = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                data[i * cols + j] = a.data[i] * b.data[j];
            }
        }
        Self {
            data,
            shape: SmallVec::from_slice(&[rows, cols]),
        }
    }

    fn check_same_size(&self, other: &Self) -> ModelResult<()> {
        if self.data.len() != other.data.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.data.len(),
                got: other.data.len(),
            });
        }
        Ok(())
    }
}

/// Tensor operations trait
pub trait TensorOps {
    /// Element-wise addition
    fn add(&self, other: &Self) -> ModelResult<Self>
    where
        Self: Sized;

    /// Element-wise subtraction
    fn sub(&self, other: &Self) -> ModelResult<Self>
    where
        Self: Sized;

    /// Element-wise multiplication
    fn mul(&self, other: &Self) -> ModelResult<Self>
    where
        Self: Sized;

    /// Scalar multiplication
    fn scale(&self, scalar: f64) -> Self
    where
        Self: Sized;

    /// Matrix-vector multiplication, `[m, n] x [n] -> [m]`
    fn matmul_vec(&self, vec: &Self) -> ModelResult<Self>
    where
        Self: Sized;

    /// Transposed matrix-vector multiplication, `[m, n]^T x [m] -> [n]`
    fn matmul_vec_transposed(&self, vec: &Self) -> ModelResult<Self>
    where
        Self: Sized;

    /// Sum all elements
    fn sum(&self) -> f64;
}

impl TensorOps for Tensor {
    fn add(&self, other: &Self) -> ModelResult<Self> {
        self.zip_with(other, |a, b| a + b)
    }

    fn sub(&self, other: &Self) -> ModelResult<Self> {
        self.zip_with(other, |a, b| a - b)
    }

    fn mul(&self, other: &Self) -> ModelResult<Self> {
        self.zip_with(other, |a, b| a * b)
    }

    fn scale(&self, scalar: f64) -> Self {
        self.map(|x| x * scalar)
    }

    fn matmul_vec(&self, vec: &Self) -> ModelResult<Self> {
        let (m, n) = self.matrix_dims()?;
        if n != vec.data.len() {
            return Err(ModelError::DimensionMismatch {
                expected: n,
                got: vec.data.len(),
            });
        }

        let mut result = vec![0.0; m];
        for i in 0..m {
            let row = &self.data[i * n..(i + 1) * n];
            result[i] = row.iter().zip(&vec.data).map(|(&w, &x)| w * x).sum();
        }

        Ok(Tensor::from_slice(&result))
    }

    fn matmul_vec_transposed(&self, vec: &Self) -> ModelResult<Self> {
        let (m, n) = self.matrix_dims()?;
        if m != vec.data.len() {
            return Err(ModelError::DimensionMismatch {
                expected: m,
                got: vec.data.len(),
            });
        }

        let mut result = vec![0.0; n];
        for i in 0..m {
            let g = vec.data[i];
            for j in 0..n {
                result[j] += self.data[i * n + j] * g;
            }
        }

        Ok(Tensor::from_slice(&result))
    }

    fn sum(&self) -> f64 {
        self.data.iter().sum()
    }
}

impl Tensor {
    fn zip_with<F>(&self, other: &Self, f: F) -> ModelResult<Self>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.check_same_size(other)?;
        Ok(Self {
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
            shape: self.shape.clone(),
        })
    }

    fn matrix_dims(&self) -> ModelResult<(usize, usize)> {
        if self.shape.len() != 2 {
            return Err(ModelError::InvalidConfig(format!(
                "expected a 2D matrix, got shape {:?}",
                self.shape
            )));
        }
        Ok((self.shape[0], self.shape[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_zeros_and_shape() {
        let t = Tensor::zeros(&[2, 3]);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.size(), 6);
        assert_eq!(t.sum(), 0.0);
    }

    #[test]
    fn test_from_vec_checks_size() {
        assert!(Tensor::from_vec(vec![1.0, 2.0, 3.0], &[2, 2]).is_err());
        assert!(Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).is_ok());
    }

    #[test]
    fn test_matmul_vec() {
        // [[1, 2], [3, 4]] x [1, 1] = [3, 7]
        let m = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        let v = Tensor::from_slice(&[1.0, 1.0]);
        assert_eq!(m.matmul_vec(&v).unwrap().data, vec![3.0, 7.0]);
    }

    #[test]
    fn test_matmul_vec_transposed() {
        // [[1, 2], [3, 4]]^T x [1, 1] = [4, 6]
        let m = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        let v = Tensor::from_slice(&[1.0, 1.0]);
        assert_eq!(m.matmul_vec_transposed(&v).unwrap().data, vec![4.0, 6.0]);
    }

    #[test]
    fn test_outer() {
        let a = Tensor::from_slice(&[1.0, 2.0]);
        let b = Tensor::from_slice(&[3.0, 4.0, 5.0]);
        let o = Tensor::outer(&a, &b);
        assert_eq!(o.shape(), &[2, 3]);
        assert_eq!(o.data, vec![3.0, 4.0, 5.0, 6.0, 8.0, 10.0]);
    }

    #[test]
    fn test_lerp_towards() {
        let mut t = Tensor::from_slice(&[0.0, 10.0]);
        let o = Tensor::from_slice(&[10.0, 0.0]);
        t.lerp_towards(&o, 0.25).unwrap();
        assert_eq!(t.data, vec![2.5, 7.5]);
    }

    #[test]
    fn test_has_non_finite() {
        let mut t = Tensor::from_slice(&[1.0, 2.0]);
        assert!(!t.has_non_finite());
        t.data[1] = f64::NAN;
        assert!(t.has_non_finite());
        t.data[1] = f64::NEG_INFINITY;
        assert!(t.has_non_finite());
    }

    #[test]
    fn test_seeded_init_is_reproducible() {
        let a = Tensor::he_init(&[4, 3], &mut StdRng::seed_from_u64(7));
        let b = Tensor::he_init(&[4, 3], &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert!(!a.has_non_finite());
    }

    #[test]
    fn test_elementwise_mismatch() {
        let a = Tensor::from_slice(&[1.0, 2.0]);
        let b = Tensor::from_slice(&[1.0]);
        assert!(a.add(&b).is_err());
        assert!(a.clone().add_assign(&b).is_err());
    }
}
