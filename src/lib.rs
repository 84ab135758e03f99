// Core modules of the coverage-plan optimizer.
pub mod cache;
pub mod config;
pub mod consts;
pub mod constraint;
pub mod core_types;
pub mod error;
pub mod events;
pub mod geometry;
pub mod optimizer;
pub mod oracle;
pub mod placement;
pub mod placer;
pub mod scenario;
pub mod solution;
pub mod variable;
pub mod workers;

// Flat re-exports so downstream code can use sarplan::* for the common types.
pub use crate::core_types::{ActiveSet, ObjectKind, Ordinal, ParticleId, SequenceId};
pub use crate::error::{PlanError, PlanResult};
pub use crate::placement::{Extent, Placement, SearchShape};
pub use crate::scenario::Scenario;
pub use crate::solution::Candidate;
pub use crate::variable::{PatternKind, PatternVariable, Sequence};
