//! Ambient engagement: probability-driven persona participation in threads
//! the router left alone.
//!
//! Everything here is additive flavor. A failed reply or reaction never
//! propagates past the single persona it concerned; cooldowns keep the
//! personas from flooding a thread.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::reactions::reaction_candidates_for_persona;
use quorum_contract::{ChatGateway, Persona, ThreadState};
use quorum_core::contains_whole_word_ci;
use quorum_deliberation::DeliberationEngine;

const DEFAULT_PIGGYBACK_PCT: u64 = 40;
const DEFAULT_REACTION_PCT: u64 = 65;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Cascade tunables: probabilities, engagement bounds, and delay windows.
pub struct CascadeConfig {
    /// Chance (percent) an unaddressed message gets a piggyback reply.
    pub piggyback_probability_pct: u64,
    /// Chance (percent) a persona reacts to a human message before replying.
    pub reaction_probability_pct: u64,
    pub min_engaged_personas: u64,
    pub max_engaged_personas: u64,
    /// "Read, think, type" latency before a reply.
    pub min_reply_delay_ms: u64,
    pub max_reply_delay_ms: u64,
    pub min_reaction_delay_ms: u64,
    pub max_reaction_delay_ms: u64,
    /// Spacing between second-and-later engaged personas.
    pub min_stagger_ms: u64,
    pub max_stagger_ms: u64,
    pub recovery_history_limit: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            piggyback_probability_pct: DEFAULT_PIGGYBACK_PCT,
            reaction_probability_pct: DEFAULT_REACTION_PCT,
            min_engaged_personas: 1,
            max_engaged_personas: 2,
            min_reply_delay_ms: 2_000,
            max_reply_delay_ms: 6_000,
            min_reaction_delay_ms: 500,
            max_reaction_delay_ms: 2_000,
            min_stagger_ms: 3_000,
            max_stagger_ms: 8_000,
            recovery_history_limit: 50,
        }
    }
}

#[async_trait]
/// Reply capability the cascade drives. The deliberation engine is the
/// production implementation; tests script it.
pub trait AgentReplier: Send + Sync {
    /// Posts an in-character reply and returns the posted text, or `None`
    /// when the persona had nothing to say.
    async fn reply_as_agent(
        &self,
        channel: &str,
        thread_ts: &str,
        incoming_text: &str,
        persona: &Persona,
        context: &str,
    ) -> Result<Option<String>>;
}

#[async_trait]
impl AgentReplier for DeliberationEngine {
    async fn reply_as_agent(
        &self,
        channel: &str,
        thread_ts: &str,
        incoming_text: &str,
        persona: &Persona,
        context: &str,
    ) -> Result<Option<String>> {
        DeliberationEngine::reply_as_agent(self, channel, thread_ts, incoming_text, persona, context)
            .await
    }
}

/// Decides whether and how personas join a conversation ambiently.
pub struct CascadeHandler {
    gateway: Arc<dyn ChatGateway>,
    thread_state: Arc<ThreadState>,
    replier: Arc<dyn AgentReplier>,
    config: CascadeConfig,
}

impl CascadeHandler {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        thread_state: Arc<ThreadState>,
        replier: Arc<dyn AgentReplier>,
        config: CascadeConfig,
    ) -> Self {
        Self {
            gateway,
            thread_state,
            replier,
            config,
        }
    }

    /// Replies as every persona whose name appears as a whole word in
    /// `text`, except the excluded one and anyone on cooldown. All mentions
    /// in one message get processed, not just the first.
    pub async fn follow_agent_mentions(
        &self,
        text: &str,
        channel: &str,
        thread_ts: &str,
        personas: &[Persona],
        context: &str,
        skip_persona_id: Option<&str>,
    ) -> Result<()> {
        for persona in personas {
            if skip_persona_id == Some(persona.id.as_str()) {
                continue;
            }
            if !contains_whole_word_ci(text, &persona.name) {
                continue;
            }
            if self
                .thread_state
                .is_persona_on_cooldown(channel, thread_ts, &persona.id)
            {
                tracing::debug!(persona = %persona.id, "mentioned persona on cooldown");
                continue;
            }
            self.apply_human_response_timing(channel, thread_ts, persona)
                .await;
            match self
                .replier
                .reply_as_agent(channel, thread_ts, text, persona, context)
                .await
            {
                Ok(Some(_)) => {
                    self.thread_state
                        .mark_persona_reply(channel, thread_ts, &persona.id);
                    self.thread_state
                        .remember_ad_hoc_thread_persona(channel, thread_ts, &persona.id);
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(persona = %persona.id, %error, "mention reply failed");
                }
            }
        }
        Ok(())
    }

    /// Probability-gated drive-by reply from a random eligible persona. When
    /// that reply itself names other personas, they get pulled in with the
    /// actual replier excluded.
    pub async fn maybe_piggyback_reply(
        &self,
        channel: &str,
        thread_ts: &str,
        text: &str,
        personas: &[Persona],
        context: &str,
        exclude_id: Option<&str>,
    ) -> Result<()> {
        if self.thread_state.random_int(1, 100) > self.config.piggyback_probability_pct {
            return Ok(());
        }
        let eligible: Vec<&Persona> = personas
            .iter()
            .filter(|persona| exclude_id != Some(persona.id.as_str()))
            .filter(|persona| {
                !self
                    .thread_state
                    .is_persona_on_cooldown(channel, thread_ts, &persona.id)
            })
            .collect();
        let Some(persona) = self.pick_random(&eligible) else {
            return Ok(());
        };

        self.apply_human_response_timing(channel, thread_ts, persona)
            .await;
        if let Some(reply) = self
            .replier
            .reply_as_agent(channel, thread_ts, text, persona, context)
            .await?
        {
            self.thread_state
                .mark_persona_reply(channel, thread_ts, &persona.id);
            self.follow_agent_mentions(
                &reply,
                channel,
                thread_ts,
                personas,
                context,
                Some(&persona.id),
            )
            .await?;
        }
        Ok(())
    }

    /// Engages a random bounded number of personas in sequence. The first
    /// gets the full human-timing treatment, later ones only a stagger
    /// delay; mentions in the final reply cascade onward.
    pub async fn engage_multiple_personas(
        &self,
        channel: &str,
        thread_ts: &str,
        message_ts: &str,
        text: &str,
        personas: &[Persona],
        context: &str,
    ) -> Result<()> {
        let eligible: Vec<&Persona> = personas
            .iter()
            .filter(|persona| {
                !self
                    .thread_state
                    .is_persona_on_cooldown(channel, thread_ts, &persona.id)
            })
            .collect();
        if eligible.is_empty() {
            return Ok(());
        }

        let upper = self.config.max_engaged_personas.min(eligible.len() as u64);
        let lower = self.config.min_engaged_personas.min(upper).max(1);
        let count = self.thread_state.random_int(lower, upper) as usize;
        let offset = self.thread_state.random_int(0, (eligible.len() - 1) as u64) as usize;

        let mut last_reply: Option<(String, String)> = None;
        for index in 0..count {
            let persona = eligible[(offset + index) % eligible.len()];
            if index == 0 {
                self.apply_human_response_timing(channel, message_ts, persona)
                    .await;
            } else {
                let stagger = self
                    .thread_state
                    .random_int(self.config.min_stagger_ms, self.config.max_stagger_ms);
                tokio::time::sleep(Duration::from_millis(stagger)).await;
            }
            match self
                .replier
                .reply_as_agent(channel, thread_ts, text, persona, context)
                .await
            {
                Ok(Some(reply)) => {
                    self.thread_state
                        .mark_persona_reply(channel, thread_ts, &persona.id);
                    last_reply = Some((persona.id.clone(), reply));
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(persona = %persona.id, %error, "engaged reply failed");
                }
            }
        }

        if let Some((replier_id, reply)) = last_reply {
            self.follow_agent_mentions(
                &reply,
                channel,
                thread_ts,
                personas,
                context,
                Some(&replier_id),
            )
            .await?;
        }
        Ok(())
    }

    /// Scans thread history newest-first for a message authored by a known
    /// persona. Used to re-establish thread ownership after a restart; any
    /// fetch error yields `None`.
    pub async fn recover_persona_from_thread_history(
        &self,
        channel: &str,
        thread_ts: &str,
        personas: &[Persona],
    ) -> Option<Persona> {
        let history = match self
            .gateway
            .channel_history(channel, thread_ts, self.config.recovery_history_limit)
            .await
        {
            Ok(history) => history,
            Err(error) => {
                tracing::debug!(%error, "history fetch failed during owner recovery");
                return None;
            }
        };
        for message in history.iter().rev() {
            let author = message.author_name.to_lowercase();
            if let Some(persona) = personas
                .iter()
                .find(|persona| persona.name.to_lowercase() == author)
            {
                return Some(persona.clone());
            }
        }
        None
    }

    /// "Read, think, type" latency: a possible reaction to the triggering
    /// message, then a jittered pause before the caller posts its reply.
    pub async fn apply_human_response_timing(
        &self,
        channel: &str,
        message_ts: &str,
        persona: &Persona,
    ) {
        self.maybe_react_to_human_message(channel, message_ts, persona)
            .await;
        let delay = self
            .thread_state
            .random_int(self.config.min_reply_delay_ms, self.config.max_reply_delay_ms);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    /// Probability-gated emoji reaction. Reaction failures (permissions,
    /// already reacted) are swallowed.
    pub async fn maybe_react_to_human_message(
        &self,
        channel: &str,
        message_ts: &str,
        persona: &Persona,
    ) {
        if self.thread_state.random_int(1, 100) > self.config.reaction_probability_pct {
            return;
        }
        let delay = self.thread_state.random_int(
            self.config.min_reaction_delay_ms,
            self.config.max_reaction_delay_ms,
        );
        tokio::time::sleep(Duration::from_millis(delay)).await;

        let candidates = reaction_candidates_for_persona(persona);
        let index = self
            .thread_state
            .random_int(0, (candidates.len() - 1) as u64) as usize;
        if let Err(error) = self
            .gateway
            .add_reaction(channel, message_ts, candidates[index])
            .await
        {
            tracing::debug!(persona = %persona.id, %error, "reaction add failed, ignoring");
        }
    }

    fn pick_random<'a>(&self, eligible: &[&'a Persona]) -> Option<&'a Persona> {
        if eligible.is_empty() {
            return None;
        }
        let index = self.thread_state.random_int(0, (eligible.len() - 1) as u64) as usize;
        Some(eligible[index])
    }
}
