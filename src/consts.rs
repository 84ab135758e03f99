/// Slack below which an optimization value counts as satisfied.
pub const OPT_EPS: f64 = 1e-9;

/// Strict-improvement margin for POS comparisons.
pub const POS_EPS: f64 = 1e-9;

pub const SECS_PER_HOUR: f64 = 3600.0;

/// Minimum number of parallel legs a placed box must hold.
pub const MIN_LEGS: f64 = 2.0;

/// Slack factor on achievable track length when checking shape legality.
pub const TRACK_SLACK: f64 = 1.05;

/// Legs flown in a sector-search pattern (two passes of three crossings).
pub const SECTOR_LEGS: f64 = 9.0;

/// Default floor on particles per cache slice before fan-out pays off.
pub const DEFAULT_MIN_SLICE: usize = 64;

/// Default Fibonacci repeat cap that ends overlap-clearing escalation.
pub const DEFAULT_FIB_CAP: u32 = 34;
