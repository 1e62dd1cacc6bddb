//! Log file format and capture engines built on `btelem-proto`'s wire
//! codec: an append-only file format with a footer-indexed reader, a
//! live rolling accumulator, and the transport capabilities both consume.

mod capture;
mod column;
mod error;
mod index;
mod live_capture;
mod log_reader;
mod log_writer;
mod transport;

pub use capture::Capture;
pub use column::{Column, ColumnBuilder};
pub use error::{CoreError, Result};
pub use index::{IndexEntry, FILE_MAGIC, FILE_VERSION, FOOTER_MAGIC};
pub use live_capture::{LiveCapture, LiveCaptureConfig};
pub use log_reader::LogReader;
pub use log_writer::LogWriter;
pub use transport::{read_stream_schema, RecvExact, Transport};
