//! Per-task report artifacts on disk.

pub mod writer;

pub use writer::ReportWriter;
