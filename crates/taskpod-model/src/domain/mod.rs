mod kv;
pub use kv::KeyValue;

mod env;
pub use env::Env;

mod flag;
pub use flag::Flag;

mod labels;
pub use labels::Labels;

mod constants;
pub use constants::*;

/// Timeout value in milliseconds.
///
/// Used for per-step limits and the run-level timeout the assembler turns
/// into a pod deadline.
pub type TimeoutMs = u64;
