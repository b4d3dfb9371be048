//! Journal schema
//!
//! This module declares which fields a journal record may carry, their value
//! kinds and ranges, and which boolean fields are derived from keywords in
//! free text rather than entered by hand.

mod field;
mod registry;

pub use field::*;
pub use registry::*;
