//! The QA agent: violation scoring and worker routing, the pattern index
//! behind routing confidence, the two bounded worker pools, the health
//! monitor that escalates stuck workers, and the daemon tying them to the
//! task store and event bus.

pub mod daemon;
pub mod decision;
pub mod executor;
pub mod monitor;
pub mod pools;
pub mod rag;

pub use daemon::{QaDaemon, QaMetrics};
pub use decision::WorkerDecisionEngine;
pub use executor::MechanicalFastFixer;
pub use monitor::WorkerMonitor;
pub use pools::{FastFixPool, FastFixer, FixReport, HeavyFixPool, PoolError, QaWorkflow};
pub use rag::{JsonPatternIndex, PatternIndex};
