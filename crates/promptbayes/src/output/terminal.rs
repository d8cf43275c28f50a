//! Terminal output formatting with colors.

use colored::Colorize;

use promptbayes_core::analysis::{LeaderboardEntry, ValidationReport};
use promptbayes_core::preflight::PriorCheckReport;
use promptbayes_core::sampler::{ConvergenceWarning, FactorEffect, SamplerDiagnostics};
use promptbayes_core::Factor;

use crate::analyzer::Analysis;

/// How many uncertain configurations the report lists.
const MAX_UNCERTAIN_LISTED: usize = 10;

fn rule() -> String {
    "\u{2500}".repeat(62)
}

fn section(out: &mut String, title: &str) {
    out.push('\n');
    out.push_str(&rule());
    out.push_str("\n\n");
    out.push_str(&format!("  {}\n\n", title.bold()));
}

/// Format a full analysis for human-readable terminal output.
pub fn format_analysis(analysis: &Analysis) -> String {
    let mut out = String::new();
    let corpus = &analysis.corpus;
    let thresholds = &analysis.scores.thresholds;

    out.push_str(&format!(
        "  {} trials, {} flagged locations ({} true errors), {} configurations trialed\n",
        corpus.n_trials, corpus.n_locations, corpus.n_true_errors, corpus.n_observed_configs
    ));

    if let Some(report) = &analysis.prior_check {
        if report.has_warnings() {
            out.push_str(&format!(
                "  {} prior check raised {} warning(s)\n",
                "\u{26A0}".yellow(),
                report.warnings.len()
            ));
        }
    }

    section(&mut out, "Factor Effects (logit scale)");
    for effect in &analysis.factor_effects {
        out.push_str(&format_factor_effect(effect));
        out.push('\n');
    }

    section(&mut out, "Configuration Results");
    let rollup = &analysis.rollup;
    let both = format!(
        "P(precision > {} AND recall > {})",
        thresholds.precision, thresholds.min_recall
    );
    out.push_str(&format!(
        "    {} > 0.9:  {}\n",
        both,
        rollup.n_likely_both.to_string().green()
    ));
    out.push_str(&format!("    {} < 0.1:  {}\n", both, rollup.n_unlikely_both));
    out.push_str(&format!(
        "    P(precision > {}) > 0.9:  {} (may be too conservative)\n",
        thresholds.precision, rollup.n_likely_high_precision
    ));
    out.push_str(&format!(
        "    P(precision > {}) < 0.1:  {}\n",
        thresholds.precision, rollup.n_unlikely_high_precision
    ));
    out.push_str(&format!(
        "    Uncertain:  {}\n",
        rollup.n_uncertain.to_string().yellow()
    ));

    section(&mut out, "Leaderboards");
    board(&mut out, "Top by recall (precision floor)", &analysis.leaderboards.by_recall);
    board(&mut out, "Top by F1", &analysis.leaderboards.by_f1);
    board(&mut out, "Top by precision", &analysis.leaderboards.by_precision);

    if !analysis.uncertain.is_empty() {
        section(&mut out, "Most Uncertain (need more trials)");
        for u in analysis.uncertain.iter().take(MAX_UNCERTAIN_LISTED) {
            let mean = analysis
                .scores
                .get(u.configuration)
                .map_or(f64::NAN, |s| s.precision.mean);
            out.push_str(&format!(
                "    Config {:>3}: P(prec>{})={:.3}, mean={:.3}\n",
                u.configuration.index(),
                thresholds.precision,
                u.prob,
                mean
            ));
        }
    }

    out.push_str(&format_sampler_section(analysis.samples.diagnostics()));
    out
}

fn board(out: &mut String, title: &str, entries: &[LeaderboardEntry]) {
    out.push_str(&format!("  {}\n", title));
    for e in entries {
        out.push_str(&format!(
            "    Config {:>3}: F1={:.3}, precision={:.3}, recall={:.3}, P(both)={:.3}\n",
            e.configuration.index(),
            e.f1,
            e.precision,
            e.recall,
            e.prob_both
        ));
    }
    out.push('\n');
}

/// One line per factor: description, name, mean ± std and the 95% interval.
pub fn format_factor_effect(effect: &FactorEffect) -> String {
    let line = format!(
        "    {:25} ({}): {:+.3} \u{00B1} {:.3}  [{:+.3}, {:+.3}]",
        effect.factor.description(),
        effect.name,
        effect.mean,
        effect.std,
        effect.ci.0,
        effect.ci.1
    );
    if !effect.is_credible() {
        line
    } else if effect.mean > 0.0 {
        line.green().to_string()
    } else {
        line.red().to_string()
    }
}

/// Sampler diagnostics section.
pub fn format_sampler_section(diagnostics: &SamplerDiagnostics) -> String {
    let mut out = String::new();
    section(&mut out, "Sampler Diagnostics");

    out.push_str(&format!(
        "    Chains:       {} \u{00D7} {} draws\n",
        diagnostics.n_chains, diagnostics.draws_per_chain
    ));
    let r_hat_str = format!("{:.3}", diagnostics.max_r_hat());
    let high_r_hat = diagnostics
        .warnings
        .iter()
        .any(|w| matches!(w, ConvergenceWarning::HighRHat { .. }));
    out.push_str(&format!(
        "    Max R-hat:    {}\n",
        if high_r_hat {
            r_hat_str.red().to_string()
        } else {
            r_hat_str.green().to_string()
        }
    ));
    out.push_str(&format!("    Min ESS:      {:.0}\n", diagnostics.min_ess()));
    out.push_str(&format!(
        "    Divergences:  {}\n",
        if diagnostics.divergences > 0 {
            diagnostics.divergences.to_string().red().to_string()
        } else {
            "0".to_string()
        }
    ));
    out.push_str(&format!(
        "    Accept stat:  {:.3}\n",
        diagnostics.mean_accept_stat
    ));

    if !diagnostics.warnings.is_empty() {
        out.push_str(&format!("\n  {} Warnings\n", "\u{26A0}".yellow()));
        for warning in &diagnostics.warnings {
            out.push_str(&format!("    \u{2022} {}\n", warning));
        }
    }
    out
}

/// Format a prior predictive report.
pub fn format_prior_check(report: &PriorCheckReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "  Prior predictive check: {} locations, {} draws\n",
        report.n_locations, report.n_samples
    ));

    section(&mut out, "Scale Hyperpriors");
    for (name, s) in [("\u{03C3}_loc", &report.sigma_loc), ("\u{03C3}_sys", &report.sigma_sys)] {
        out.push_str(&format!(
            "    {}: mean={:.3}, median={:.3}, range=[{:.3}, {:.3}]\n",
            name, s.mean, s.median, s.min, s.max
        ));
    }

    section(&mut out, "Detection Probabilities");
    for d in &report.detection {
        let active: Vec<&str> = Factor::ALL
            .iter()
            .filter(|&&f| d.factors.is_on(f))
            .map(|f| f.key())
            .collect();
        out.push_str(&format!(
            "    {} [{}]\n      mean={:.3}, median={:.3}, range=[{:.3}, {:.3}], extreme={:.1}%\n",
            d.label,
            active.join(", "),
            d.mean,
            d.median,
            d.min,
            d.max,
            d.extreme_fraction() * 100.0
        ));
    }

    section(&mut out, "Implied Precision");
    let p = &report.precision;
    out.push_str(&format!(
        "    {} of {} locations true errors\n",
        p.n_true_errors, report.n_locations
    ));
    out.push_str(&format!(
        "    mean={:.3}, median={:.3}, P(>0.8)={:.3}, P(<0.2)={:.3}\n",
        p.mean, p.median, p.prob_above_80, p.prob_below_20
    ));

    if report.has_warnings() {
        out.push_str(&format!("\n  {} Warnings\n", "\u{26A0}".yellow()));
        for w in &report.warnings {
            out.push_str(&format!("    \u{2022} {}\n      {}\n", w, w.guidance().dimmed()));
        }
    } else {
        out.push_str(&format!("\n  {} priors look reasonable\n", "\u{2713}".green()));
    }
    out
}

/// Format a held-out validation report.
pub fn format_validation(report: &ValidationReport) -> String {
    let mut out = String::new();
    section(&mut out, "Held-out Validation");
    for v in &report.configurations {
        out.push_str(&format!(
            "  Config {:>3} ({} trials)\n",
            v.configuration.index(),
            v.n_trials
        ));
        for (label, c) in [("precision", &v.precision), ("recall", &v.recall)] {
            let z = match c.z_score {
                Some(z) if z.abs() > 2.0 => format!("z={:+.2}", z).red().to_string(),
                Some(z) => format!("z={:+.2}", z),
                None => "z=n/a".to_string(),
            };
            out.push_str(&format!(
                "    {:9} observed {:.3} \u{00B1} {:.3}, predicted {:.3} \u{00B1} {:.3}, {}\n",
                label, c.observed_mean, c.observed_std, c.predicted_mean, c.predicted_std, z
            ));
        }
        out.push_str(&format!(
            "    {:9} observed {:.3} over all ground truth\n",
            "recall", v.observed_recall_all
        ));
    }
    out.push_str("\n  Compared recall covers the ground-truth lines the fitted trials flagged.\n");
    out.push_str(&format!(
        "\n  Mean |error|: precision {:.3}, recall {:.3}\n",
        report.mean_abs_precision_error, report.mean_abs_recall_error
    ));
    out
}
