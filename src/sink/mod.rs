//! Tabular sink — external spreadsheet receiving completed submissions.

pub mod sheets;
pub mod tabular;

pub use sheets::SheetsSink;
pub use tabular::{MemorySink, SubmissionRow, TabularSink};
