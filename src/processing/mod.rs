pub mod csv_writer;
pub mod output;
pub mod summary;

pub use output::{CsvResultWriter, MemoryResults, RestartReader, ResultWriter};
pub use summary::{RunSummary, StepRecord};
