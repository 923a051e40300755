//! Chat transport and job execution seams.
//!
//! Both collaborators are fire-and-forget from this core's perspective: job
//! completion and failure are reported back into chat by the dispatcher
//! itself, never awaited here.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::persona::Persona;
use crate::project::Project;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `PostedMessage` used across Quorum components.
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One entry of a channel history window, newest-last.
pub struct ChatMessage {
    pub author_name: String,
    pub text: String,
}

#[async_trait]
/// Chat transport seam: posting, history windows, reactions.
pub trait ChatGateway: Send + Sync {
    async fn post_as_persona(
        &self,
        channel: &str,
        text: &str,
        persona: &Persona,
        thread_ts: Option<&str>,
    ) -> Result<PostedMessage>;

    /// Returns up to `limit` thread messages, newest-last.
    async fn channel_history(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>>;

    async fn add_reaction(&self, channel: &str, message_ts: &str, emoji_name: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `JobKind` values.
pub enum JobKind {
    Run,
    Review,
    Qa,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Review => "review",
            Self::Qa => "qa",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `ProviderKind` values.
pub enum ProviderKind {
    Claude,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }

    /// Keyword that names this provider in chat text.
    pub fn keyword(self) -> &'static str {
        self.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Coding-agent job parameters extracted by the router.
pub struct JobRequest {
    pub kind: JobKind,
    #[serde(default)]
    pub pr_number: Option<u64>,
    #[serde(default)]
    pub issue_number: Option<u64>,
    /// Set when the requesting message mentions a merge conflict.
    #[serde(default)]
    pub resolve_conflicts: bool,
    /// Accumulated review feedback carried into follow-up jobs.
    #[serde(default)]
    pub feedback: Option<String>,
}

impl JobRequest {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            pr_number: None,
            issue_number: None,
            resolve_conflicts: false,
            feedback: None,
        }
    }
}

#[async_trait]
/// Job execution seam: spawns external coding-agent work.
pub trait JobDispatch: Send + Sync {
    async fn spawn_job(
        &self,
        request: JobRequest,
        project: &Project,
        channel: &str,
        thread_ts: Option<&str>,
        persona: &Persona,
    ) -> Result<()>;

    async fn spawn_direct_provider_request(
        &self,
        prompt: &str,
        provider: ProviderKind,
        project: &Project,
        channel: &str,
        thread_ts: Option<&str>,
        persona: &Persona,
    ) -> Result<()>;
}
