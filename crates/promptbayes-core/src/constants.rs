//! Constants used throughout the crate.

/// Default deterministic seed for RNG operations.
///
/// Same seed + same corpus = same posterior, same scores.
/// The value `0x70726F6D707473` is "prompts" encoded in ASCII.
pub const DEFAULT_SEED: u64 = 0x70726F6D707473;

/// Number of binary prompting factors.
pub const N_FACTORS: usize = 7;

/// Number of configurations in the full factorial design (2^7).
pub const N_CONFIGS: usize = 1 << N_FACTORS;

/// Floor applied to the expected-detections denominator of precision.
pub const PRECISION_DENOMINATOR_FLOOR: f64 = 1e-10;

// =============================================================================
// Prior defaults
// =============================================================================

/// Standard deviation of the Normal prior on the global intercept α.
pub const DEFAULT_INTERCEPT_SD: f64 = 5.0;

/// Rate of the Exponential hyperprior on σ_loc.
pub const DEFAULT_LOCATION_SCALE_RATE: f64 = 5.0;

/// Rate of the Exponential hyperprior on σ_sys.
pub const DEFAULT_FACTOR_SCALE_RATE: f64 = 5.0;

// =============================================================================
// Decision defaults
// =============================================================================

/// Precision level a configuration has to clear to count as "high precision".
pub const DEFAULT_PRECISION_THRESHOLD: f64 = 0.8;

/// Default recall floor used in the joint decision probability.
pub const DEFAULT_MIN_RECALL: f64 = 0.1;

/// Lower edge of the "genuinely uncertain" probability band.
pub const DEFAULT_UNCERTAIN_LOW: f64 = 0.1;

/// Upper edge of the "genuinely uncertain" probability band.
pub const DEFAULT_UNCERTAIN_HIGH: f64 = 0.9;

/// Mean precision a configuration needs to appear on the recall leaderboard.
pub const DEFAULT_RECALL_BOARD_MIN_PRECISION: f64 = 0.2;

// =============================================================================
// Sampler defaults
// =============================================================================

/// Default number of retained draws per chain.
pub const DEFAULT_DRAWS: usize = 2000;

/// Default number of warmup (tuning) iterations per chain.
pub const DEFAULT_TUNE: usize = 1000;

/// Default number of independent chains.
pub const DEFAULT_CHAINS: usize = 4;

/// Target mean acceptance statistic for step-size adaptation.
pub const DEFAULT_TARGET_ACCEPT: f64 = 0.8;

/// Default leapfrog steps per HMC transition.
pub const DEFAULT_LEAPFROG_STEPS: usize = 32;

/// Energy error above which a transition counts as divergent.
pub const DIVERGENCE_ENERGY_THRESHOLD: f64 = 1000.0;

/// Split-R̂ above which a parameter is flagged as not converged.
pub const R_HAT_THRESHOLD: f64 = 1.01;

/// Minimum bulk ESS per chain before a parameter is flagged.
pub const MIN_ESS_PER_CHAIN: f64 = 100.0;

/// Default number of prior predictive simulations.
pub const DEFAULT_PRIOR_SAMPLES: usize = 1000;
