//! Shared data model and collaborator seams for the Quorum orchestration
//! core.
//!
//! The router, deliberation engine, and cascade handler all speak in these
//! types; the chat transport, job execution, AI completion, and discussion
//! persistence sit behind the traits defined here.

pub mod completion;
pub mod discussion;
pub mod gateway;
pub mod persona;
pub mod project;
pub mod thread_state;
pub mod trigger;

pub use completion::{CompletionClient, CompletionError};
pub use discussion::{
    ConsensusResult, Discussion, DiscussionStatus, DiscussionStore, InMemoryDiscussionStore,
};
pub use gateway::{
    ChatGateway, ChatMessage, JobDispatch, JobKind, JobRequest, PostedMessage, ProviderKind,
};
pub use persona::{find_persona_by_category, role_category, Persona, RoleCategory};
pub use project::Project;
pub use thread_state::{ThreadState, ThreadStateConfig};
pub use trigger::{Trigger, TriggerSignature, TriggerType};
