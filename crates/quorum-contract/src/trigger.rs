//! Trigger values and the dedup signature they reduce to.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `TriggerType` values.
pub enum TriggerType {
    PrReview,
    BuildFailure,
    PrdKickoff,
    Other,
}

impl TriggerType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrReview => "pr_review",
            Self::BuildFailure => "build_failure",
            Self::PrdKickoff => "prd_kickoff",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Ephemeral description of why a discussion should start.
pub struct Trigger {
    pub trigger_type: TriggerType,
    pub project_path: String,
    /// PR / issue / PRD identifier.
    pub reference: String,
    /// Free-text context handed to contribution prompts.
    #[serde(default)]
    pub context: String,
    /// Explicit destination channel, when the caller knows one.
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl Trigger {
    pub fn signature(&self) -> TriggerSignature {
        TriggerSignature {
            project_path: self.project_path.clone(),
            trigger_type: self.trigger_type,
            reference: self.reference.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Dedup key: at most one active discussion exists per signature.
pub struct TriggerSignature {
    pub project_path: String,
    pub trigger_type: TriggerType,
    pub reference: String,
}

impl TriggerSignature {
    /// Stable string form used as a map key and in log lines.
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.project_path,
            self.trigger_type.as_str(),
            self.reference
        )
    }
}
