//! Property-based tests for the reference estimator
//!
//! Tests:
//! - Output width and determinism of estimates
//! - Refused updates leave every parameter bit-identical
//! - argmax picks a maximal, lowest-index entry

use proptest::prelude::*;
use splitq_ml::{ActionValueEstimator, NetworkConfig, QNetwork, QSample, argmax};

fn small_net(input: usize, actions: usize, seed: u64) -> QNetwork {
    let config = NetworkConfig {
        hidden_sizes: vec![5],
        seed: Some(seed),
        ..NetworkConfig::default()
    };
    QNetwork::new(input, actions, config).unwrap()
}

fn param_bits(net: &QNetwork) -> Vec<u64> {
    net.parameters()
        .iter()
        .flat_map(|t| t.data.iter().map(|x| x.to_bits()))
        .collect()
}

proptest! {
    /// One value per action, and the same input always gives the same values
    #[test]
    fn estimate_is_deterministic(
        input in 1usize..8,
        actions in 1usize..8,
        seed in any::<u64>(),
    ) {
        let net = small_net(input, actions, seed);
        let features: Vec<f64> = (0..input).map(|i| (i % 2) as f64).collect();
        let first = net.estimate(&features).unwrap();
        let second = net.estimate(&features).unwrap();
        prop_assert_eq!(first.len(), actions);
        prop_assert_eq!(first, second);
    }

    /// Any NaN or infinity in a gradient blocks the whole update
    #[test]
    fn non_finite_gradient_is_refused(
        seed in any::<u64>(),
        which in 0usize..4,
        poison in prop_oneof![Just(f64::NAN), Just(f64::INFINITY), Just(f64::NEG_INFINITY)],
    ) {
        let mut net = small_net(3, 3, seed);
        let batch = [QSample { features: vec![1.0, 0.0, 1.0], action: 1, target: 2.0 }];
        let (_, mut grads) = net.compute_gradients(&batch).unwrap();
        grads.tensors_mut()[which].data[0] = poison;

        let before = param_bits(&net);
        prop_assert!(net.apply_gradients(&grads).is_err());
        prop_assert_eq!(before, param_bits(&net));
    }

    /// argmax returns a maximal entry with no larger entry before it
    #[test]
    fn argmax_is_first_maximum(values in prop::collection::vec(-5i32..5, 1..20)) {
        let values: Vec<f64> = values.into_iter().map(f64::from).collect();
        let best = argmax(&values).unwrap();
        for (i, &v) in values.iter().enumerate() {
            prop_assert!(v <= values[best]);
            if i < best {
                prop_assert!(v < values[best]);
            }
        }
    }
}
