//! Logging setup and the operator-facing text sink shared by the hive
//! daemons and CLI.

pub mod logging;
pub mod sink;

pub use logging::{init_logging, init_logging_json};
pub use sink::{BufferSink, StdoutSink, TextSink};
