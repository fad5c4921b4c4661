//! # Configuration Module
//!
//! This module centralizes all configuration constants for pw-dedup. Constants
//! are grouped by their functional area and interdependencies are documented
//! and enforced through compile-time assertions.
//!
//! ## Why Centralization?
//!
//! The slab size, block window size and set width all feed into each other
//! (a record must fit in a slab, a slab and a block window are fixed page
//! multiples, the set width must be a power of two for mask indexing).
//! Co-locating them with compile-time checks prevents mismatch bugs.
//!
//! ## Module Organization
//!
//! - [`constants`]: All numeric configuration values with dependency
//!   documentation, plus the runtime page-size query.

pub mod constants;
pub use constants::*;
