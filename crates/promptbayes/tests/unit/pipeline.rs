//! End-to-end: files in, analysis document out, validation against it.

use std::collections::BTreeSet;

use promptbayes::{
    data, output, AnalysisConfig, AnalysisError, Analyzer, Configuration, Factor, FitPolicy,
    SamplerConfig, TrialRecord,
};
use promptbayes_core::analysis::validate_predictions;

const TRUE_ERRORS: [u32; 2] = [3, 7];

/// Reasoning raises detection of every line by roughly the same logit
/// shift. Over 20 trials each, config 64 flags lines 3, 7 and 11 in 16, 13
/// and 9 trials; config 0 in 4, 2 and 1.
fn corpus() -> Vec<TrialRecord> {
    let on = Configuration::new(64).unwrap();
    let off = Configuration::new(0).unwrap();
    let mut trials = Vec::new();
    for i in 0..20 {
        let hit_on = [(3, i < 16), (7, (3..16).contains(&i)), (11, i >= 11)];
        let hit_off = [(3, i < 4), (7, (1..3).contains(&i)), (11, i == 19)];
        let lines = |hits: [(u32, bool); 3]| hits.into_iter().filter(|h| h.1).map(|h| h.0);
        trials.push(TrialRecord::for_configuration(on, lines(hit_on)));
        trials.push(TrialRecord::for_configuration(off, lines(hit_off)));
    }
    trials
}

fn config() -> AnalysisConfig {
    AnalysisConfig::quick()
        .with_sampler(
            SamplerConfig::default()
                .with_draws(200)
                .with_tune(200)
                .with_chains(2)
                .with_leapfrog_steps(16)
                .with_seed(11),
        )
        .with_prior_check_samples(100)
        .with_fit_policy(FitPolicy::FailOpen)
}

fn truth() -> BTreeSet<u32> {
    TRUE_ERRORS.into_iter().collect()
}

#[test]
fn reasoning_configuration_has_higher_recall() {
    let analysis = Analyzer::new(config()).analyze(&corpus(), &truth()).unwrap();
    let on = analysis.scores.get(Configuration::new(64).unwrap()).unwrap();
    let off = analysis.scores.get(Configuration::new(0).unwrap()).unwrap();

    assert!(
        on.recall.mean > off.recall.mean + 0.3,
        "recall on={} off={}",
        on.recall.mean,
        off.recall.mean
    );

    let reasoning = analysis
        .factor_effects
        .iter()
        .find(|e| e.factor == Factor::UseReasoning)
        .unwrap();
    assert!(reasoning.mean > 1.0, "u_s_r mean {}", reasoning.mean);
    assert!(reasoning.is_credible());
}

#[test]
fn analysis_is_deterministic() {
    let a = Analyzer::new(config()).analyze(&corpus(), &truth()).unwrap();
    let b = Analyzer::new(config()).analyze(&corpus(), &truth()).unwrap();
    assert_eq!(a.scores, b.scores);
    assert_eq!(a.uncertain, b.uncertain);
    assert_eq!(a.leaderboards, b.leaderboards);
}

#[test]
fn document_roundtrip_feeds_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("analysis.json");

    let analysis = Analyzer::new(config()).analyze(&corpus(), &truth()).unwrap();
    output::write_analysis(&path, &analysis).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    for key in [
        "factor_effects",
        "config_results",
        "uncertain_configs",
        "summary",
        "sampler",
        "prior_check",
        "leaderboards",
    ] {
        assert!(value.get(key).is_some(), "missing {}", key);
    }
    assert!(value["factor_effects"].get("u_s_r").is_some());
    assert_eq!(value["true_error_lines"], serde_json::json!([3, 7]));

    let record = &value["config_results"]["64"];
    assert_eq!(record["config"]["use_reasoning"], true);
    assert_eq!(record["config_idx"], 64);
    for key in [
        "prob_precision_gt_80",
        "prob_recall_gt_min",
        "prob_both",
        "mean_precision",
        "std_precision",
        "median_precision",
        "mean_recall",
        "std_recall",
        "median_recall",
    ] {
        assert!(record[key].is_number(), "config_results.64 missing {}", key);
    }
    let scored = analysis.scores.get(Configuration::new(64).unwrap()).unwrap();
    assert!((record["mean_precision"].as_f64().unwrap() - scored.precision.mean).abs() < 1e-12);

    for key in [
        "high_both_count",
        "low_both_count",
        "high_precision_only_count",
        "low_precision_count",
        "uncertain_count",
    ] {
        assert!(value["summary"][key].is_u64(), "summary missing {}", key);
    }
    assert_eq!(
        value["summary"]["uncertain_count"],
        analysis.rollup.n_uncertain
    );

    let table = output::load_score_table(&path).unwrap();
    assert_eq!(table.len(), analysis.scores.len());
    assert_eq!(table.thresholds, analysis.scores.thresholds);
    for (read, scored) in table.iter().zip(analysis.scores.iter()) {
        assert_eq!(read.configuration, scored.configuration);
        assert_eq!(read.config, scored.config);
        assert!((read.prob_both - scored.prob_both).abs() < 1e-12);
        assert!((read.precision.mean - scored.precision.mean).abs() < 1e-12);
    }

    let held_out = vec![
        TrialRecord::for_configuration(Configuration::new(64).unwrap(), [3, 7]),
        TrialRecord::for_configuration(Configuration::new(64).unwrap(), [3]),
    ];
    let report = validate_predictions(&table, &truth(), &held_out).unwrap();
    assert_eq!(report.configurations.len(), 1);
    let v = &report.configurations[0];
    assert_eq!(v.precision.observed_mean, 1.0);
    assert_eq!(v.recall.observed_mean, 0.75);

    let direct = analysis.validate(&truth(), &held_out).unwrap();
    assert_eq!(direct.configurations[0].trials, v.trials);
    assert!((direct.mean_abs_recall_error - report.mean_abs_recall_error).abs() < 1e-9);
}

#[test]
fn never_flagged_truth_is_left_out_of_compared_recall() {
    // Line 99 is a true error that no trial ever flags
    let truth: BTreeSet<u32> = [3, 7, 99].into_iter().collect();
    let analysis = Analyzer::new(config().skip_prior_check(true))
        .analyze(&corpus(), &truth)
        .unwrap();
    assert_eq!(analysis.scores.n_true_errors, 2);
    assert_eq!(analysis.scores.true_error_lines, vec![3, 7]);

    let c = Configuration::new(64).unwrap();
    let held_out = vec![TrialRecord::for_configuration(c, [3, 7, 11]); 5];
    let report = analysis.validate(&truth, &held_out).unwrap();
    let v = report.get(c).unwrap();
    assert_eq!(v.recall.observed_mean, 1.0);
    assert!((v.observed_recall_all - 2.0 / 3.0).abs() < 1e-12);
    // Both sides of the comparison are fractions of {3, 7}, so a trial that
    // flags all of them cannot fall short of the prediction
    assert!(v.recall.difference >= 0.0);
    assert!(v.recall.z_score.map_or(true, |z| z >= 0.0));
}

#[test]
fn files_to_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let trials_path = dir.path().join("trials.json");
    let truth_path = dir.path().join("truth.json");

    let results: Vec<serde_json::Value> = corpus()
        .iter()
        .map(|t| {
            serde_json::json!({
                "config": t.factors,
                "config_index": t.configuration().index(),
                "detected_lines": t.detected_lines,
            })
        })
        .collect();
    std::fs::write(
        &trials_path,
        serde_json::json!({ "results": results }).to_string(),
    )
    .unwrap();
    std::fs::write(
        &truth_path,
        r#"{"errors": [{"line": 3}, {"line": 7}]}"#,
    )
    .unwrap();

    let trials = data::load_trials(&trials_path).unwrap();
    let truth = data::load_ground_truth(&truth_path).unwrap();
    assert_eq!(trials, corpus());

    let analysis = Analyzer::new(config().skip_prior_check(true))
        .analyze(&trials, &truth)
        .unwrap();
    assert_eq!(analysis.corpus.n_locations, 3);
    assert_eq!(analysis.corpus.n_true_errors, 2);
    assert_eq!(analysis.corpus.n_observations, 120);

    let report = output::format_analysis(&analysis);
    assert!(report.contains("Factor Effects"));
    assert!(report.contains("Reasoning tokens"));
}

#[test]
fn mismatched_declared_index_fails_fast() {
    let mut trials = corpus();
    trials[5].declared_index = Some(1);
    assert!(matches!(
        Analyzer::new(config()).analyze(&trials, &truth()),
        Err(AnalysisError::Input(_))
    ));
}
