//! Interaction log storage.

pub mod csv;
pub mod memory;

pub use csv::{CsvExporter, ExportError};
pub use memory::{InteractionLog, InteractionLogEntry};
