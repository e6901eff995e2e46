//! The Queen orchestrator: drives a natural-language goal through
//! plan → dispatch → gather → commit/PR over the terminal transport,
//! producing version-controlled artifacts at the end of a successful run.

pub mod gitops;
pub mod plan;
pub mod queen;

pub use gitops::{GitError, GitWorkflow};
pub use queen::{Queen, QueenError, RunOutcome, RunPhase};
