//! Property-based tests for tensors
//!
//! Tests:
//! - Soft-update interpolation
//! - Transposed products against an explicit transpose

use proptest::prelude::*;
use splitq_ml::{Tensor, TensorOps};

fn vec_of(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-10.0f64..10.0, len)
}

proptest! {
    /// Interpolating with tau lands on the weighted mean of both sides
    #[test]
    fn lerp_is_weighted_mean(
        (a, b) in (1usize..16).prop_flat_map(|n| (vec_of(n), vec_of(n))),
        tau in 0.0f64..=1.0,
    ) {
        let mut target = Tensor::from_slice(&a);
        let online = Tensor::from_slice(&b);
        target.lerp_towards(&online, tau).unwrap();

        for i in 0..a.len() {
            let expected = tau * b[i] + (1.0 - tau) * a[i];
            prop_assert!((target.data[i] - expected).abs() < 1e-9);
        }
    }

    /// Interpolating fully copies the online side
    #[test]
    fn lerp_with_one_copies(
        (a, b) in (1usize..16).prop_flat_map(|n| (vec_of(n), vec_of(n))),
    ) {
        let mut target = Tensor::from_slice(&a);
        target.lerp_towards(&Tensor::from_slice(&b), 1.0).unwrap();
        prop_assert_eq!(target.data, b);
    }

    /// W^T v computed directly matches the product with an explicit transpose
    #[test]
    fn transposed_product_matches_transpose(
        rows in 1usize..6,
        cols in 1usize..6,
        seed in any::<u64>(),
    ) {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let w = Tensor::random_uniform(&[rows, cols], -1.0, 1.0, &mut rng);
        let v = Tensor::random_uniform(&[rows], -1.0, 1.0, &mut rng);

        let mut transposed = vec![0.0; rows * cols];
        for r in 0..rows {
            for c in 0..cols {
                transposed[c * rows + r] = w.data[r * cols + c];
            }
        }
        let wt = Tensor::from_vec(transposed, &[cols, rows]).unwrap();

        let direct = w.matmul_vec_transposed(&v).unwrap();
        let explicit = wt.matmul_vec(&v).unwrap();
        for (x, y) in direct.data.iter().zip(&explicit.data) {
            prop_assert!((x - y).abs() < 1e-12);
        }
    }
}
