//! Run-time side of compiled flows: parameter expansion and an in-process
//! session used by the local driver and by tests.

mod expand;
mod helpers;
mod memory_session;

pub use expand::{destructure_names, Expander, EXEC_KEY};
pub use memory_session::{MemorySession, SessionEffect, SessionOutcome};
