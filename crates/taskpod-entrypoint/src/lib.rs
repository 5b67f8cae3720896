//! Cooperative step sequencing inside a task pod.
//!
//! Steps are ordinary containers the cluster starts concurrently; ordering
//! is imposed from within. Each step container runs a wrapper that waits on
//! its predecessor's out-file, executes the real command with timeout and
//! error-policy enforcement, and writes its own terminal record atomically
//! so the next wrapper (and any external observer) sees a complete JSON
//! document or nothing.

mod error;
mod runner;
mod state;
mod waiter;

pub use error::EntrypointError;
pub use runner::{StepRunConfig, StepRunner};
pub use state::{StepState, TerminalRecord};
pub use waiter::{POLL_INTERVAL, WaitOutcome, wait_for_record};
