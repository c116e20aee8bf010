pub mod diff;
pub mod duplicates;
pub mod stats;

pub use diff::{diff, DiffSummary};
pub use duplicates::find_duplicates;
pub use stats::verification_stats;
