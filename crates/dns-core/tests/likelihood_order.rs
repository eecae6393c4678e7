use std::cmp::Ordering;

use dns_core::{LikelihoodValue, RandomStream};
use proptest::prelude::*;

#[test]
fn log_likelihood_dominates_tiebreak() {
    let low = LikelihoodValue::new(-3.0, 0.99);
    let high = LikelihoodValue::new(-2.0, 0.01);
    assert!(low < high);
    assert_eq!(high.cmp(&low), Ordering::Greater);
}

#[test]
fn tiebreak_resolves_plateaus() {
    let a = LikelihoodValue::new(1.5, 0.2);
    let b = LikelihoodValue::new(1.5, 0.7);
    assert!(a < b);
    assert_eq!(a, LikelihoodValue::new(1.5, 0.2));
}

#[test]
fn minus_infinity_is_below_everything_finite() {
    let floor = LikelihoodValue::MINUS_INFINITY;
    assert!(floor < LikelihoodValue::new(-1e300, 0.0));
    assert!(floor < LikelihoodValue::new(f64::MIN, 0.5));
}

#[test]
fn perturbed_tiebreak_stays_in_unit_interval() {
    let mut rng = RandomStream::from_seed(11);
    let mut value = LikelihoodValue::with_random_tiebreak(0.0, &mut rng);
    for _ in 0..5_000 {
        value.perturb_tiebreak(&mut rng);
        assert!((0.0..1.0).contains(&value.tiebreak()));
        assert_eq!(value.log_l(), 0.0);
    }
}

#[test]
fn json_roundtrip_preserves_finite_values() {
    let value = LikelihoodValue::new(-12.375, 0.125);
    let json = serde_json::to_string(&value).expect("serialize");
    let decoded: LikelihoodValue = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(decoded.log_l().to_bits(), value.log_l().to_bits());
    assert_eq!(decoded.tiebreak().to_bits(), value.tiebreak().to_bits());
}

proptest! {
    #[test]
    fn ordering_is_lexicographic(
        a in -1e6f64..1e6,
        b in -1e6f64..1e6,
        ta in 0.0f64..1.0,
        tb in 0.0f64..1.0,
    ) {
        let x = LikelihoodValue::new(a, ta);
        let y = LikelihoodValue::new(b, tb);
        let expected = a.total_cmp(&b).then(ta.total_cmp(&tb));
        prop_assert_eq!(x.cmp(&y), expected);
        prop_assert_eq!(y.cmp(&x), expected.reverse());
    }

    #[test]
    fn sorting_yields_non_decreasing_sequence(values in prop::collection::vec((-50.0f64..50.0, 0.0f64..1.0), 1..64)) {
        let mut sorted: Vec<LikelihoodValue> = values
            .iter()
            .map(|(l, t)| LikelihoodValue::new(*l, *t))
            .collect();
        sorted.sort();
        for pair in sorted.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
    }
}
