//! Input side of the pipeline.
//!
//! - `discovery` — finds CSV extracts under the input root and sorts them
//!   into the three categories by filename.
//! - `loader`    — reads and normalizes one category's files into a
//!   `CategoryTable`.
//! - `fixtures` (test only) — representative extract payloads.

pub mod discovery;
pub mod loader;

#[cfg(test)]
pub(crate) mod fixtures;
