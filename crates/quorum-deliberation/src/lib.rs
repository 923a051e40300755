//! Multi-persona deliberation engine.
//!
//! Runs the full discussion lifecycle over the seams defined in
//! `quorum-contract`: opening post, ordered contribution rounds, the
//! lead-driven consensus loop, human-interruption debounce, and ad-hoc
//! replies. All outbound text passes through the humanizer first.

pub mod engine;
pub mod humanize;
pub mod prompts;

pub use engine::{DeliberationConfig, DeliberationEngine};
pub use humanize::{cadence_key, humanize, EmojiCadence, HumanizeConfig, SKIP_SENTINEL};
