//! Cascading ambient engagement.
//!
//! Invoked only after the router declines a message: mention following,
//! probability-gated piggyback replies, bounded multi-persona engagement,
//! thread-owner recovery, and the human-timing/reaction flavor that makes
//! persona replies land like a coworker's.

pub mod handler;
pub mod reactions;

pub use handler::{AgentReplier, CascadeConfig, CascadeHandler};
pub use reactions::reaction_candidates_for_persona;
