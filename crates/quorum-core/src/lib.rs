//! Foundational low-level utilities shared across Quorum crates.
//!
//! Provides time helpers, a dependency-free jitter source for human-timing
//! delays, and the text predicates behind mention and bot-address matching.

pub mod jitter;
pub mod text;
pub mod time_utils;

pub use jitter::random_int_in;
pub use text::{
    contains_whole_word_ci, find_whole_word_ci, starts_with_token_ci, truncate_with_ellipsis,
};
pub use time_utils::current_unix_timestamp_ms;
