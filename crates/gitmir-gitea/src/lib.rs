pub mod client;
pub mod rate_limit;

pub use client::{GiteaClient, GiteaError, RepoOptions};
pub use rate_limit::TokenBucket;
