//! Terminal output for the `codeweave` binary

pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use output::{error, header, info, print_result, section, success, summary_row, warn};
pub use progress::IngestProgress;
pub use table::{entity_table, stats_table};
pub use theme::{Icons, Theme, theme};
