pub mod planner;
pub mod scheduler;

pub use gitmir_core::cancel::CancellationToken;
pub use planner::is_due;
pub use scheduler::{Scheduler, TriggerOutcome};
