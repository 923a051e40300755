//! Per-thread runtime state: reply cooldowns, remembered ad-hoc thread
//! owners, the issue-review replay guard, and timing jitter.
//!
//! Nothing here persists across restarts; the windows are best-effort replay
//! protection, not durable delivery guarantees.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::persona::Persona;
use quorum_core::{current_unix_timestamp_ms, random_int_in};

const DEFAULT_PERSONA_COOLDOWN_MS: u64 = 10 * 60 * 1_000;
const DEFAULT_ISSUE_REVIEW_GUARD_MS: u64 = 30 * 60 * 1_000;

#[derive(Debug, Clone, Copy)]
/// Tunable windows for `ThreadState`.
pub struct ThreadStateConfig {
    pub persona_cooldown_ms: u64,
    pub issue_review_guard_ms: u64,
}

impl Default for ThreadStateConfig {
    fn default() -> Self {
        Self {
            persona_cooldown_ms: DEFAULT_PERSONA_COOLDOWN_MS,
            issue_review_guard_ms: DEFAULT_ISSUE_REVIEW_GUARD_MS,
        }
    }
}

#[derive(Default)]
struct ThreadStateInner {
    /// `(channel, thread, persona)` -> last ambient reply, unix ms.
    persona_replies: HashMap<(String, String, String), u64>,
    /// `(channel, thread)` -> persona id owning the ad-hoc thread.
    ad_hoc_owners: HashMap<(String, String), String>,
    /// Issue URL -> last review trigger, unix ms.
    reviewed_issues: HashMap<String, u64>,
}

/// Shared runtime state for cooldown and ownership decisions. All methods
/// take `&self`; the inner map lock is never held across an await point.
pub struct ThreadState {
    config: ThreadStateConfig,
    inner: Mutex<ThreadStateInner>,
}

impl Default for ThreadState {
    fn default() -> Self {
        Self::new(ThreadStateConfig::default())
    }
}

impl ThreadState {
    pub fn new(config: ThreadStateConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(ThreadStateInner::default()),
        }
    }

    pub fn is_persona_on_cooldown(&self, channel: &str, thread_ts: &str, persona_id: &str) -> bool {
        let Ok(inner) = self.inner.lock() else {
            return false;
        };
        let key = (
            channel.to_string(),
            thread_ts.to_string(),
            persona_id.to_string(),
        );
        inner.persona_replies.get(&key).is_some_and(|last| {
            current_unix_timestamp_ms().saturating_sub(*last) < self.config.persona_cooldown_ms
        })
    }

    pub fn mark_persona_reply(&self, channel: &str, thread_ts: &str, persona_id: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.persona_replies.insert(
                (
                    channel.to_string(),
                    thread_ts.to_string(),
                    persona_id.to_string(),
                ),
                current_unix_timestamp_ms(),
            );
        }
    }

    pub fn remember_ad_hoc_thread_persona(&self, channel: &str, thread_ts: &str, persona_id: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.ad_hoc_owners.insert(
                (channel.to_string(), thread_ts.to_string()),
                persona_id.to_string(),
            );
        }
    }

    /// Resolves the remembered owner id against the current persona roster.
    pub fn get_remembered_ad_hoc_persona(
        &self,
        channel: &str,
        thread_ts: &str,
        personas: &[Persona],
    ) -> Option<Persona> {
        let inner = self.inner.lock().ok()?;
        let owner_id = inner
            .ad_hoc_owners
            .get(&(channel.to_string(), thread_ts.to_string()))?;
        personas
            .iter()
            .find(|persona| &persona.id == owner_id)
            .cloned()
    }

    pub fn mark_issue_reviewed(&self, url: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .reviewed_issues
                .insert(url.to_string(), current_unix_timestamp_ms());
        }
    }

    pub fn is_issue_on_cooldown(&self, url: &str) -> bool {
        let Ok(inner) = self.inner.lock() else {
            return false;
        };
        inner.reviewed_issues.get(url).is_some_and(|last| {
            current_unix_timestamp_ms().saturating_sub(*last) < self.config.issue_review_guard_ms
        })
    }

    /// Inclusive-range jitter used for human-timing delays.
    pub fn random_int(&self, min: u64, max: u64) -> u64 {
        random_int_in(min, max)
    }
}
