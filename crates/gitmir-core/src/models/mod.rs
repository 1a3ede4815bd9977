pub mod lease;
pub mod mirror;
pub mod sync_attempt;
