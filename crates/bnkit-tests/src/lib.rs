//! Shared fixtures for the bnkit integration and property tests.

use std::sync::Arc;

use bnkit_core::{
    joint_probability_of_evidence, CancellationToken, Evidence, Network, VarId,
};
use rand::Rng;

/// gender → age, the two-variable census network.
pub fn census() -> Arc<Network> {
    let mut net = Network::new("census");
    let gender = net.add_variable("gender", ["male", "female"]).unwrap();
    let age = net.add_variable("age", ["<15", ">=15"]).unwrap();
    net.add_parent(age, gender).unwrap();
    net.set_cpt(gender, vec![0.55, 0.45]).unwrap();
    net.set_cpt(age, vec![0.55, 0.45, 0.50, 0.50]).unwrap();
    Arc::new(net)
}

/// rain → sprinkler, {rain, sprinkler} → wet.
pub fn sprinkler() -> Arc<Network> {
    let mut net = Network::new("sprinkler");
    let rain = net.add_variable("rain", ["no", "yes"]).unwrap();
    let sprinkler = net.add_variable("sprinkler", ["off", "on"]).unwrap();
    let wet = net.add_variable("wet", ["dry", "wet"]).unwrap();
    net.add_parent(sprinkler, rain).unwrap();
    net.add_parent(wet, rain).unwrap();
    net.add_parent(wet, sprinkler).unwrap();
    net.set_cpt(rain, vec![0.8, 0.2]).unwrap();
    net.set_cpt(sprinkler, vec![0.6, 0.4, 0.99, 0.01]).unwrap();
    net.set_cpt(wet, vec![1.0, 0.0, 0.2, 0.8, 0.1, 0.9, 0.01, 0.99]).unwrap();
    Arc::new(net)
}

/// The eight-variable chest clinic network, every domain `[yes, no]`.
pub fn asia() -> Arc<Network> {
    let mut net = Network::new("asia");
    let yes_no = ["yes", "no"];
    let asia = net.add_variable("asia", yes_no).unwrap();
    let tub = net.add_variable("tub", yes_no).unwrap();
    let smoke = net.add_variable("smoke", yes_no).unwrap();
    let lung = net.add_variable("lung", yes_no).unwrap();
    let bronc = net.add_variable("bronc", yes_no).unwrap();
    let either = net.add_variable("either", yes_no).unwrap();
    let xray = net.add_variable("xray", yes_no).unwrap();
    let dysp = net.add_variable("dysp", yes_no).unwrap();
    for (child, parent) in [
        (tub, asia),
        (lung, smoke),
        (bronc, smoke),
        (either, lung),
        (either, tub),
        (xray, either),
        (dysp, bronc),
        (dysp, either),
    ] {
        net.add_parent(child, parent).unwrap();
    }
    net.set_cpt(asia, vec![0.01, 0.99]).unwrap();
    net.set_cpt(tub, vec![0.05, 0.95, 0.01, 0.99]).unwrap();
    net.set_cpt(smoke, vec![0.5, 0.5]).unwrap();
    net.set_cpt(lung, vec![0.1, 0.9, 0.01, 0.99]).unwrap();
    net.set_cpt(bronc, vec![0.6, 0.4, 0.3, 0.7]).unwrap();
    // parents (lung, tub), lung varying faster
    net.set_cpt(either, vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0]).unwrap();
    net.set_cpt(xray, vec![0.98, 0.02, 0.05, 0.95]).unwrap();
    // parents (bronc, either), bronc varying faster
    net.set_cpt(dysp, vec![0.9, 0.1, 0.7, 0.3, 0.8, 0.2, 0.1, 0.9]).unwrap();
    Arc::new(net)
}

/// x0 → x1 → ... → x(n-1), each with `card` values.
pub fn chain(n: usize, card: usize) -> Arc<Network> {
    let mut net = Network::new(format!("chain{}", n));
    let labels: Vec<String> = (0..card).map(|v| format!("v{}", v)).collect();
    let mut previous: Option<VarId> = None;
    for i in 0..n {
        let var = net.add_variable(&format!("x{}", i), &labels).unwrap();
        if let Some(parent) = previous {
            net.add_parent(var, parent).unwrap();
        }
        let rows = net.variable(var).parent_combinations();
        let mut table = Vec::with_capacity(rows * card);
        for row in 0..rows {
            let weights: Vec<f64> = (0..card).map(|v| 1.0 + ((row + 2 * v + i) % 3) as f64).collect();
            let total: f64 = weights.iter().sum();
            table.extend(weights.iter().map(|w| w / total));
        }
        net.set_cpt(var, table).unwrap();
        previous = Some(var);
    }
    Arc::new(net)
}

/// Random DAG over `n` variables: each variable draws up to `max_parents` parents from
/// the variables before it and 2..=`max_card` values. About one CPT entry in ten is an
/// exact zero.
pub fn random_network<R: Rng + ?Sized>(rng: &mut R, n: usize, max_parents: usize, max_card: usize) -> Network {
    let mut net = Network::new("random");
    for i in 0..n {
        let card = rng.random_range(2..=max_card.max(2));
        let labels: Vec<String> = (0..card).map(|v| format!("s{}", v)).collect();
        let var = net.add_variable(&format!("v{}", i), &labels).unwrap();
        let wanted = rng.random_range(0..=max_parents.min(i));
        let mut candidates: Vec<usize> = (0..i).collect();
        for _ in 0..wanted {
            let pick = candidates.swap_remove(rng.random_range(0..candidates.len()));
            net.add_parent(var, VarId(pick as u32)).unwrap();
        }
        let rows = net.variable(var).parent_combinations();
        let mut table = Vec::with_capacity(rows * card);
        for _ in 0..rows {
            let mut weights: Vec<f64> = (0..card)
                .map(|_| if rng.random_bool(0.1) { 0.0 } else { rng.random::<f64>() + 0.01 })
                .collect();
            let total: f64 = weights.iter().sum();
            if total == 0.0 {
                weights[0] = 1.0;
            } else {
                weights.iter_mut().for_each(|w| *w /= total);
            }
            table.extend(weights);
        }
        net.set_cpt(var, table).unwrap();
    }
    net.normalize_all(bnkit_core::ZeroSumPolicy::Equiprobable);
    net
}

/// Posterior of `var` by summing the full joint.
pub fn brute_force_posterior(network: &Network, evidence: &Evidence, var: VarId) -> Vec<f64> {
    let never = CancellationToken::never();
    let card = network.variable(var).cardinality();
    if let Some(observed) = evidence.get(var) {
        return (0..card).map(|v| if v == observed { 1.0 } else { 0.0 }).collect();
    }
    let joint: Vec<f64> = (0..card)
        .map(|value| {
            let mut extended = evidence.clone();
            extended.set(var, value);
            joint_probability_of_evidence(network, &extended, &never)
        })
        .collect();
    let total: f64 = joint.iter().sum();
    if total == 0.0 {
        return vec![1.0 / card as f64; card];
    }
    joint.iter().map(|p| p / total).collect()
}

pub fn assert_close(actual: f64, expected: f64, tol: f64, label: &str) {
    assert!(
        (actual - expected).abs() <= tol,
        "{} mismatch: expected {:.15}, got {:.15}, diff={:.3e}",
        label,
        expected,
        actual,
        (actual - expected).abs()
    );
}
