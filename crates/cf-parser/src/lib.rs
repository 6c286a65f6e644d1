//! Command normalizer: turns the shorthand forms authors write into the
//! canonical [`Command`](cf_core::Command) tree, and back.

mod control;
mod messages;
mod normalize;
mod raw;

pub use normalize::{normalize_flow, normalize_flow_command, start_target};
pub use raw::{flow_to_raw, to_raw_param};

#[cfg(test)]
mod tests;
