pub mod log;
pub mod store;
pub mod writer;

pub use log::{read_log, CSV_HEADER};
pub use store::{AppendOutcome, HistoryStore};
pub use writer::{CsvSink, DurableSink, StoreAlert};
