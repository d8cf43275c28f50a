//! Worked scenarios of extraction, scoring and ranking on fixed draws.

use std::collections::BTreeSet;

use promptbayes_core::analysis::{
    rank_uncertain, score_all_configurations, ScoringThresholds, UncertaintyBand,
};
use promptbayes_core::constants::N_FACTORS;
use promptbayes_core::{Configuration, Draw, ObservationTable, PosteriorSamples, TrialRecord};

fn config(index: usize) -> Configuration {
    Configuration::new(index).unwrap()
}

fn draw(alpha: f64, u_loc: Vec<f64>, u_factor: [f64; N_FACTORS]) -> Draw {
    Draw {
        alpha,
        sigma_loc: 0.5,
        sigma_sys: 0.5,
        u_loc,
        u_factor,
    }
}

#[test]
fn scenario_two_trials_two_locations() {
    let trials = vec![
        TrialRecord::for_configuration(config(0), [5]),
        TrialRecord::for_configuration(config(1), [5, 9]),
    ];
    let table = ObservationTable::extract(&trials, &BTreeSet::from([5])).unwrap();

    assert_eq!(table.n_locations(), 2);
    assert_eq!(table.lines(), &[5, 9]);
    assert_eq!(table.is_true_error(), &[true, false]);
    assert_eq!(table.observations().len(), 4);
    let detected: Vec<bool> = table.observations().iter().map(|o| o.detected).collect();
    assert_eq!(detected, vec![true, false, true, true]);
}

#[test]
fn scenario_all_true_errors_give_unit_precision() {
    let draws = vec![
        draw(-1.0, vec![0.3, -2.0, 1.1], [0.2, -0.4, 0.0, 0.9, -1.3, 0.1, 0.6]),
        draw(0.5, vec![-0.7, 0.0, 2.2], [-0.5, 0.3, 0.8, 0.0, 0.4, -0.2, 1.0]),
    ];
    let samples = PosteriorSamples::from_draws(draws).unwrap();
    let table =
        score_all_configurations(&samples, &[true, true, true], &ScoringThresholds::default())
            .unwrap();

    for s in table.iter() {
        assert_eq!(s.precision.mean, 1.0, "config {}", s.configuration);
        assert_eq!(s.prob_high_precision, 1.0);
    }
}

#[test]
fn scenario_zero_effects_make_configurations_identical() {
    let draws = (0..5)
        .map(|d| draw(-1.0 + d as f64 * 0.5, vec![0.0; 4], [0.0; N_FACTORS]))
        .collect();
    let samples = PosteriorSamples::from_draws(draws).unwrap();
    let table = score_all_configurations(
        &samples,
        &[true, false, true, false],
        &ScoringThresholds::default(),
    )
    .unwrap();

    let first = &table.scores[0];
    for s in table.iter() {
        assert_eq!(s.precision, first.precision);
        assert_eq!(s.recall, first.recall);
        assert_eq!(s.prob_both, first.prob_both);
    }
    // Equal detection probability everywhere: precision is the true share
    assert!((first.precision.mean - 0.5).abs() < 1e-12);
}

#[test]
fn scenario_uncertainty_band() {
    let ranked = rank_uncertain(&[0.05, 0.5, 0.95], &UncertaintyBand::new(0.1, 0.9));
    assert_eq!(ranked, vec![(1, 0.5)]);
}

#[test]
fn bounds_hold_for_extreme_draws() {
    let draws = vec![
        draw(40.0, vec![30.0, -30.0], [10.0; N_FACTORS]),
        draw(-40.0, vec![-30.0, 30.0], [-10.0; N_FACTORS]),
    ];
    let samples = PosteriorSamples::from_draws(draws).unwrap();
    let table =
        score_all_configurations(&samples, &[true, false], &ScoringThresholds::default())
            .unwrap();
    for s in table.iter() {
        for v in [s.precision.mean, s.recall.mean, s.prob_both] {
            assert!((0.0..=1.0).contains(&v), "{} out of bounds", v);
        }
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn arb_draw(n_locations: usize) -> impl Strategy<Value = Draw> {
        (
            -8.0..8.0f64,
            prop::collection::vec(-6.0..6.0f64, n_locations),
            prop::array::uniform7(-4.0..4.0f64),
        )
            .prop_map(|(alpha, u_loc, u_factor)| draw(alpha, u_loc, u_factor))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn scores_are_probabilities(
            draws in prop::collection::vec(arb_draw(4), 1..6),
            truth in prop::array::uniform4(any::<bool>()),
        ) {
            let samples = PosteriorSamples::from_draws(draws).unwrap();
            let table = score_all_configurations(
                &samples,
                &truth,
                &ScoringThresholds::default(),
            )
            .unwrap();
            prop_assert_eq!(table.len(), 128);
            for s in table.iter() {
                prop_assert!((0.0..=1.0).contains(&s.precision.mean));
                prop_assert!((0.0..=1.0).contains(&s.recall.mean));
                prop_assert!(s.prob_both <= s.prob_high_precision.min(s.prob_recall_gt_min) + 1e-12);
            }
        }
    }
}
