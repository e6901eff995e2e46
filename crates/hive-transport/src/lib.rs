//! Terminal transport for the hive: a tmux session with named panes, the
//! sentinel framing that turns scraped pane text back into structured
//! request/response pairs, and the append-only JSONL event log that records
//! every dispatch and status.

pub mod dispatch;
pub mod event_log;
pub mod sentinel;
pub mod tmux;

pub use dispatch::Dispatcher;
pub use event_log::{LogRecord, RecordKind, TaskEventLog};
pub use tmux::{TmuxTransport, Transport, TransportError};
