use clap::Args;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::consts::{DEFAULT_FIB_CAP, DEFAULT_MIN_SLICE};
use crate::error::PlanResult;

#[derive(Args, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[command(flatten)]
    pub search: SearchParams,
    #[command(flatten)]
    pub refine: RefineParams,
    #[command(flatten)]
    pub placer: PlacerParams,
    #[command(flatten)]
    pub cache: CacheParams,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> PlanResult<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> PlanResult<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Automatic solver instances run by the coordinator.
    #[arg(long, default_value_t = 2)]
    pub solver_count: usize,

    /// Worker threads for the shared pool. 0 = autodetect.
    #[arg(long, default_value_t = 0)]
    pub worker_threads: usize,

    #[arg(long, default_value_t = 60.0)]
    pub budget_secs: f64,

    /// Randomized pairwise re-placement attempts per from-scratch jump.
    #[arg(long, default_value_t = 12)]
    pub pairwise_jump_attempts: usize,

    /// On the first jump of a run, leave seeded placements alone unless they
    /// conflict with another seed.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    pub hold_seeds_on_first_jump: bool,

    /// Epoch seconds of the planning-horizon start.
    #[arg(long, default_value_t = 0.0)]
    pub plan_epoch_sec: f64,

    #[arg(long)]
    pub rng_seed: Option<u64>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            solver_count: 2,
            worker_threads: 0,
            budget_secs: 60.0,
            pairwise_jump_attempts: 12,
            hold_seeds_on_first_jump: true,
            plan_epoch_sec: 0.0,
            rng_seed: None,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineParams {
    /// Raw overlap (nm) that maps to ranking value +1.
    #[arg(long, default_value_t = 5.0)]
    pub overlap_threshold_nm: f64,

    /// Worst-overlap ranking below -margin lets a clearing stage be skipped.
    #[arg(long, default_value_t = 0.25)]
    pub very_clear_margin: f64,

    /// Fibonacci repeat cap that ends constraint-stage escalation.
    #[arg(long, default_value_t = DEFAULT_FIB_CAP)]
    pub fib_cap: u32,

    #[arg(long, default_value_t = 10.0)]
    pub stage_secs: f64,

    #[arg(long, default_value_t = 40)]
    pub max_passes: usize,

    /// Look-back window (passes) for the plateau check.
    #[arg(long, default_value_t = 6)]
    pub lookback_passes: usize,

    /// Relative objective growth over the look-back window below which a
    /// stage ends.
    #[arg(long, default_value_t = 0.002)]
    pub min_rel_growth: f64,

    #[arg(long, default_value_t = 30.0)]
    pub twist_step_deg: f64,

    /// Scale on the per-variable base move distance.
    #[arg(long, default_value_t = 1.0)]
    pub move_scale: f64,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            overlap_threshold_nm: 5.0,
            very_clear_margin: 0.25,
            fib_cap: DEFAULT_FIB_CAP,
            stage_secs: 10.0,
            max_passes: 40,
            lookback_passes: 6,
            min_rel_growth: 0.002,
            twist_step_deg: 30.0,
            move_scale: 1.0,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacerParams {
    /// First-leg headings tried, evenly spaced over 0-180 degrees.
    #[arg(long, default_value_t = 6)]
    pub headings: usize,

    #[arg(long, default_value_t = 4)]
    pub split_rounds: usize,

    /// Grid cells on the large side of the box being split.
    #[arg(long, default_value_t = 8)]
    pub grid_cells: usize,

    /// Minimum grid cells on the small side.
    #[arg(long, default_value_t = 2)]
    pub min_cells_small: usize,

    /// Lattice positions per axis when rattling a fixed-size box.
    #[arg(long, default_value_t = 5)]
    pub rattle_cells: usize,
}

impl Default for PlacerParams {
    fn default() -> Self {
        Self {
            headings: 6,
            split_rounds: 4,
            grid_cells: 8,
            min_cells_small: 2,
            rattle_cells: 5,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheParams {
    /// Particles per slice below which a batch is not worth fanning out.
    #[arg(long, default_value_t = DEFAULT_MIN_SLICE)]
    pub min_slice: usize,
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            min_slice: DEFAULT_MIN_SLICE,
        }
    }
}
