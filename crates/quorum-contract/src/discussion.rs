//! Discussion records, their consensus state machine vocabulary, and the
//! persistence seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::trigger::{TriggerSignature, TriggerType};
use quorum_core::current_unix_timestamp_ms;

static DISCUSSION_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `DiscussionStatus` values.
pub enum DiscussionStatus {
    Active,
    Consensus,
    Blocked,
}

impl DiscussionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Consensus => "consensus",
            Self::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `ConsensusResult` values.
pub enum ConsensusResult {
    Approved,
    ChangesRequested,
    HumanNeeded,
}

impl ConsensusResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::ChangesRequested => "changes_requested",
            Self::HumanNeeded => "human_needed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Unit of multi-agent consensus. Terminal records are kept for replay-guard
/// lookups, never deleted by this core.
pub struct Discussion {
    pub id: String,
    pub project_path: String,
    pub trigger_type: TriggerType,
    pub trigger_ref: String,
    pub channel_id: String,
    pub thread_ts: String,
    pub status: DiscussionStatus,
    pub round: u32,
    /// Persona ids in first-contribution order, no duplicates.
    pub participants: Vec<String>,
    pub consensus_result: Option<ConsensusResult>,
    pub updated_unix_ms: u64,
}

impl Discussion {
    pub fn new(signature: &TriggerSignature, channel_id: String, thread_ts: String) -> Self {
        let count = DISCUSSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        let now = current_unix_timestamp_ms();
        Self {
            id: format!("disc-{now}-{count}"),
            project_path: signature.project_path.clone(),
            trigger_type: signature.trigger_type,
            trigger_ref: signature.reference.clone(),
            channel_id,
            thread_ts,
            status: DiscussionStatus::Active,
            round: 1,
            participants: Vec::new(),
            consensus_result: None,
            updated_unix_ms: now,
        }
    }

    pub fn signature(&self) -> TriggerSignature {
        TriggerSignature {
            project_path: self.project_path.clone(),
            trigger_type: self.trigger_type,
            reference: self.trigger_ref.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == DiscussionStatus::Active
    }

    /// Records a contributing persona, preserving first-contribution order.
    pub fn add_participant(&mut self, persona_id: &str) {
        if !self.participants.iter().any(|id| id == persona_id) {
            self.participants.push(persona_id.to_string());
        }
    }

    pub fn touch(&mut self) {
        self.updated_unix_ms = current_unix_timestamp_ms();
    }
}

#[async_trait]
/// Repository seam for discussion records. Implementations must keep
/// terminal records queryable for replay-guard decisions.
pub trait DiscussionStore: Send + Sync {
    async fn find_by_signature(&self, signature: &TriggerSignature) -> Result<Option<Discussion>>;
    async fn find_by_thread(&self, channel_id: &str, thread_ts: &str)
        -> Result<Option<Discussion>>;
    async fn insert(&self, discussion: Discussion) -> Result<()>;
    async fn update(&self, discussion: &Discussion) -> Result<()>;
}

/// Mutex-held map store, sufficient for a single-process deployment and for
/// tests. One record per trigger signature.
#[derive(Default)]
pub struct InMemoryDiscussionStore {
    records: Mutex<HashMap<String, Discussion>>,
}

impl InMemoryDiscussionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DiscussionStore for InMemoryDiscussionStore {
    async fn find_by_signature(&self, signature: &TriggerSignature) -> Result<Option<Discussion>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow!("discussion store lock is poisoned"))?;
        Ok(records.get(&signature.key()).cloned())
    }

    async fn find_by_thread(
        &self,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Option<Discussion>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow!("discussion store lock is poisoned"))?;
        Ok(records
            .values()
            .find(|record| record.channel_id == channel_id && record.thread_ts == thread_ts)
            .cloned())
    }

    async fn insert(&self, discussion: Discussion) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("discussion store lock is poisoned"))?;
        records.insert(discussion.signature().key(), discussion);
        Ok(())
    }

    async fn update(&self, discussion: &Discussion) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("discussion store lock is poisoned"))?;
        records.insert(discussion.signature().key(), discussion.clone());
        Ok(())
    }
}
