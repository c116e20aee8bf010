pub mod history;
pub mod snapshots;
pub mod sqlite;

pub use sqlite::Database;
