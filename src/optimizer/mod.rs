pub mod coordinator;
pub mod moves;
pub mod refiner;
pub mod solver;
pub mod store;

pub use self::coordinator::Coordinator;
pub use self::moves::{Move, MoveClass, MoveEngine};
pub use self::refiner::{Refiner, Stage, StageReport, StopReason};
pub use self::solver::{JumpStyle, Solver, SolverOptions};
pub use self::store::{active_set_signature, SharedOutcomeStore};
