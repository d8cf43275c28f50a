//! Tests for analysis configuration validation and presets.

use promptbayes::{
    AnalysisConfig, ConfigError, DecisionBars, FitPolicy, PriorSpec, SamplerConfig,
    UncertaintyBand,
};

// =============================================================================
// PRESETS
// =============================================================================

#[test]
fn presets_validate() {
    for name in ["quick", "balanced", "thorough"] {
        let config = AnalysisConfig::preset(name).unwrap();
        assert!(config.validate().is_ok(), "preset {} invalid", name);
    }
}

#[test]
fn presets_scale_sampler_effort() {
    let quick = AnalysisConfig::quick().sampler.total_draws();
    let balanced = AnalysisConfig::balanced().sampler.total_draws();
    let thorough = AnalysisConfig::thorough().sampler.total_draws();
    assert!(quick < balanced && balanced < thorough);
}

#[test]
fn unknown_preset_is_none() {
    assert!(AnalysisConfig::preset("exhaustive").is_none());
}

// =============================================================================
// THRESHOLDS AND BANDS
// =============================================================================

#[test]
fn precision_threshold_bounds() {
    for bad in [0.0, 1.0, -0.5, f64::NAN] {
        let config = AnalysisConfig::default().with_precision_threshold(bad);
        assert!(
            matches!(
                config.validate(),
                Err(ConfigError::Invalid {
                    field: "thresholds.precision",
                    ..
                })
            ),
            "precision threshold {} accepted",
            bad
        );
    }
}

#[test]
fn min_recall_zero_valid() {
    let config = AnalysisConfig::default().with_min_recall(0.0);
    assert!(config.validate().is_ok());
}

#[test]
fn min_recall_one_rejected() {
    let config = AnalysisConfig::default().with_min_recall(1.0);
    assert!(config.validate().is_err());
}

#[test]
fn band_must_be_ordered() {
    let config = AnalysisConfig::default().with_band(UncertaintyBand::new(0.5, 0.5));
    assert!(config.validate().is_err());

    let config = AnalysisConfig::default().with_band(UncertaintyBand::new(0.0, 1.0));
    assert!(config.validate().is_ok());
}

#[test]
fn bars_must_be_ordered() {
    let config = AnalysisConfig::default().with_bars(DecisionBars {
        likely: 0.2,
        unlikely: 0.8,
    });
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Invalid { field: "bars", .. })
    ));
}

// =============================================================================
// PRIOR AND SAMPLER
// =============================================================================

#[test]
fn non_positive_prior_rejected() {
    let config = AnalysisConfig::default().with_prior(PriorSpec {
        factor_scale_rate: 0.0,
        ..PriorSpec::default()
    });
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Invalid {
            field: "prior.factor_scale_rate",
            ..
        })
    ));
}

#[test]
fn sampler_errors_wrapped() {
    let config =
        AnalysisConfig::default().with_sampler(SamplerConfig::default().with_target_accept(0.0));
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::Sampler(_)));
    assert!(err.to_string().contains("target_accept"));
}

#[test]
fn config_serializes() {
    let config = AnalysisConfig::quick().with_fit_policy(FitPolicy::FailClosed);
    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"fit_policy\":\"fail_closed\""));
    let back: AnalysisConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}
