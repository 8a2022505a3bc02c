//! Property tests for normalization, enumeration, stratified sampling and engine
//! agreement on random networks.

use std::collections::BTreeSet;
use std::sync::Arc;

use bnkit_core::{
    DomainSpliterator, EliminationEngine, InferenceEngine, Network, RecursiveConditioningEngine,
    RemainderStrategy, SimpleConditioningEngine, StratifiedConfig, StratifiedSampler, VarId,
    ZeroSumPolicy,
};
use bnkit_tests::{brute_force_posterior, random_network};
use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn split_pieces(piece: DomainSpliterator, depth: usize, out: &mut Vec<DomainSpliterator>) {
    if depth == 0 {
        out.push(piece);
        return;
    }
    match piece.split() {
        (left, Some(right)) => {
            split_pieces(left, depth - 1, out);
            split_pieces(right, depth - 1, out);
        }
        (whole, None) => out.push(whole),
    }
}

fn random_evidence(rng: &mut SmallRng, network: &Network, max: usize) -> Vec<(VarId, usize)> {
    let count = rng.random_range(0..=max.min(network.len()));
    let mut chosen = Vec::new();
    for _ in 0..count {
        let var = VarId(rng.random_range(0..network.len()) as u32);
        if chosen.iter().any(|(v, _)| *v == var) {
            continue;
        }
        let value = rng.random_range(0..network.variable(var).cardinality());
        chosen.push((var, value));
    }
    chosen
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn normalization_is_idempotent(raw in prop::collection::vec(0.0f64..10.0, 12), zero_row in any::<bool>()) {
        let mut net = Network::new("n");
        let a = net.add_variable("a", ["0", "1"]).unwrap();
        let b = net.add_variable("b", ["0", "1", "2"]).unwrap();
        net.add_parent(b, a).unwrap();
        let mut table = raw[..6].to_vec();
        if zero_row {
            table[..3].fill(0.0);
        }
        net.set_cpt(b, table).unwrap();
        net.set_cpt(a, raw[6..8].to_vec()).unwrap();
        for policy in [ZeroSumPolicy::Equiprobable, ZeroSumPolicy::KeepPrevious] {
            let mut once = net.clone();
            once.normalize_all(policy);
            let mut twice = once.clone();
            twice.normalize_all(policy);
            prop_assert_eq!(once.variable(a).cpt(), twice.variable(a).cpt());
            prop_assert_eq!(once.variable(b).cpt(), twice.variable(b).cpt());
        }
        let mut equi = net.clone();
        equi.normalize_all(ZeroSumPolicy::Equiprobable);
        prop_assert!(equi.validate().is_ok());
    }

    #[test]
    fn split_pieces_cover_the_domain_exactly(
        cards in prop::collection::vec(1usize..5, 0..5),
        depth in 0usize..6,
    ) {
        let vars = cards.iter().enumerate().map(|(i, c)| (VarId(i as u32), *c));
        let whole = DomainSpliterator::over(vars);
        let expected: Vec<_> = whole.clone().into_iter().collect();
        prop_assert_eq!(expected.len() as u128, whole.size());

        let mut pieces = Vec::new();
        split_pieces(whole, depth, &mut pieces);
        let mut seen = BTreeSet::new();
        let mut total = 0usize;
        for piece in pieces {
            for combination in piece {
                total += 1;
                prop_assert!(seen.insert(combination.to_vec()), "duplicate {:?}", combination);
            }
        }
        prop_assert_eq!(total, expected.len());
        let all: BTreeSet<Vec<usize>> = expected.iter().map(|c| c.to_vec()).collect();
        prop_assert_eq!(seen, all);
    }

    #[test]
    fn stratified_counts_are_exact(
        seed in any::<u64>(),
        total in 0u64..5_000,
        multinomial in any::<bool>(),
    ) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let net = Arc::new(random_network(&mut rng, 5, 2, 3));
        let evidence = random_evidence(&mut rng, &net, 1);
        let mut engine = EliminationEngine::new(net.clone()).unwrap();
        for (var, value) in &evidence {
            engine.set_evidence(*var, *value).unwrap();
        }
        if engine.probability_of_evidence().unwrap() == 0.0 {
            return Ok(());
        }
        let config = StratifiedConfig {
            strategy: if multinomial { RemainderStrategy::Multinomial } else { RemainderStrategy::RoundAndSample },
            seed,
        };
        let sampler = StratifiedSampler::new(engine, total, config).unwrap();
        let mut sum = 0u64;
        let mut seen = BTreeSet::new();
        for stratum in sampler {
            let (assignment, count) = stratum.unwrap();
            prop_assert!(count > 0);
            sum += count;
            prop_assert!(net.joint_probability(&assignment) > 0.0);
            for (var, value) in &evidence {
                prop_assert_eq!(assignment[var.index()], *value);
            }
            prop_assert!(seen.insert(assignment));
        }
        prop_assert_eq!(sum, total);
    }

    #[test]
    fn engines_agree_on_random_networks(seed in any::<u64>(), n in 1usize..7) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let net = Arc::new(random_network(&mut rng, n, 3, 3));
        let evidence = random_evidence(&mut rng, &net, 2);

        let mut engines: Vec<Box<dyn InferenceEngine>> = vec![
            Box::new(EliminationEngine::new(net.clone()).unwrap()),
            Box::new(RecursiveConditioningEngine::new(net.clone()).unwrap()),
            Box::new(SimpleConditioningEngine::new(net.clone()).unwrap()),
        ];
        let mut known = bnkit_core::Evidence::new();
        for (var, value) in &evidence {
            known.set(*var, *value);
            for engine in engines.iter_mut() {
                engine.set_evidence(*var, *value).unwrap();
            }
        }
        let oracle = bnkit_core::joint_probability_of_evidence(&net, &known, &bnkit_core::CancellationToken::never());
        for var in net.ids() {
            let expected = brute_force_posterior(&net, &known, var);
            for engine in engines.iter_mut() {
                let actual = engine.marginal_of(var).unwrap();
                for (a, e) in actual.iter().zip(&expected) {
                    prop_assert!((a - e).abs() < 1e-6, "P({:?}) {} vs {}", var, a, e);
                }
            }
        }
        for engine in engines.iter_mut() {
            prop_assert!((engine.probability_of_evidence().unwrap() - oracle).abs() < 1e-9);
        }
    }
}
