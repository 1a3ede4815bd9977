pub mod engine;

pub use engine::{SyncContext, SyncEngine, SyncOutcome};
pub use gitmir_core::cancel::CancellationToken;
