// src/formatting/mod.rs
//! Text renderings of run data: the CSV dialect of dataset files, snapshot
//! tables and the console summary.

mod csv;
mod snapshot;
mod summary;

pub use self::csv::parse_csv;
pub use self::snapshot::{render_snapshot, snapshot_order, SNAPSHOT_COLUMNS};
pub use self::summary::render_summary;
