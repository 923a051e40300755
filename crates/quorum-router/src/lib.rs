//! Message classification and trigger routing.
//!
//! `MessageRouter::try_route` inspects one inbound message and fires at most
//! one trigger: issue review, direct provider request, coding-agent job, or
//! issue pickup, in that priority order. A miss returns `false` so the
//! caller can offer the message to the ambient cascade instead.

pub mod classify;
pub mod router;

pub use classify::{Classifier, IssueRef, ProviderRequest};
pub use router::{resolve_project_by_hint, InboundMessage, MessageRouter, RouterConfig};
