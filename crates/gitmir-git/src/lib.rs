pub mod driver;

pub use driver::{scrub_stderr, scrub_url, GitDriver, GitOutput};
