//! Discussion lifecycle: concurrency-safe starts, contribution rounds, the
//! iterative consensus loop, human-interruption debounce, and ad-hoc
//! persona replies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use serde::Deserialize;
use tokio::task::AbortHandle;

use crate::humanize::{cadence_key, humanize, EmojiCadence, HumanizeConfig, SKIP_SENTINEL};
use crate::prompts;
use quorum_contract::{
    find_persona_by_category, ChatGateway, ChatMessage, CompletionClient, ConsensusResult,
    Discussion, DiscussionStatus, DiscussionStore, JobDispatch, JobKind, JobRequest, Persona,
    Project, RoleCategory, Trigger, TriggerType,
};
use quorum_core::current_unix_timestamp_ms;

const DEFAULT_MAX_ROUNDS: u32 = 3;
const DEFAULT_REPLAY_GUARD_MS: u64 = 30 * 60 * 1_000;
const DEFAULT_INTER_POST_DELAY_MS: u64 = 2_000;
const DEFAULT_INTERRUPTION_DEBOUNCE_MS: u64 = 60_000;
const DEFAULT_ROUND_HISTORY_LIMIT: usize = 20;
const DEFAULT_CONSENSUS_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Tunables for the deliberation engine.
pub struct DeliberationConfig {
    /// Channel used when a trigger carries no explicit destination.
    pub home_channel: String,
    pub max_rounds: u32,
    /// Terminal discussions younger than this are reused instead of
    /// re-triggering a fresh thread.
    pub replay_guard_ms: u64,
    /// Pacing delay between persona posts inside one round.
    pub inter_post_delay_ms: u64,
    pub round_history_limit: usize,
    pub consensus_history_limit: usize,
    /// Quiet window after a human message before the team picks back up.
    pub interruption_debounce_ms: u64,
    pub humanize: HumanizeConfig,
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self {
            home_channel: "general".to_string(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            replay_guard_ms: DEFAULT_REPLAY_GUARD_MS,
            inter_post_delay_ms: DEFAULT_INTER_POST_DELAY_MS,
            round_history_limit: DEFAULT_ROUND_HISTORY_LIMIT,
            consensus_history_limit: DEFAULT_CONSENSUS_HISTORY_LIMIT,
            interruption_debounce_ms: DEFAULT_INTERRUPTION_DEBOUNCE_MS,
            humanize: HumanizeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsensusVerdict {
    Approve(String),
    Changes(String),
    Human(String),
    Unparsable,
}

fn parse_consensus_verdict(raw: &str) -> ConsensusVerdict {
    for line in raw.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(prompts::APPROVE_MARKER) {
            return ConsensusVerdict::Approve(rest.trim().to_string());
        }
        if let Some(rest) = line.strip_prefix(prompts::CHANGES_MARKER) {
            return ConsensusVerdict::Changes(rest.trim().to_string());
        }
        if let Some(rest) = line.strip_prefix(prompts::HUMAN_MARKER) {
            return ConsensusVerdict::Human(rest.trim().to_string());
        }
    }
    ConsensusVerdict::Unparsable
}

/// Last run of digits in a trigger reference ("PR#42", ".../pull/42").
fn parse_reference_number(reference: &str) -> Option<u64> {
    let mut last: Option<u64> = None;
    let mut current = String::new();
    for ch in reference.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if !current.is_empty() {
            last = current.parse().ok().or(last);
            current.clear();
        }
    }
    if !current.is_empty() {
        last = current.parse().ok().or(last);
    }
    last
}

type SharedStart = Shared<BoxFuture<'static, Result<Discussion, String>>>;

/// Owns the discussion state machine. Share via `Arc`; `start_discussion`
/// and `handle_human_message` need the `Arc` receiver to spawn detached
/// work.
pub struct DeliberationEngine {
    gateway: Arc<dyn ChatGateway>,
    completion: Arc<dyn CompletionClient>,
    store: Arc<dyn DiscussionStore>,
    jobs: Arc<dyn JobDispatch>,
    config: DeliberationConfig,
    cadence: EmojiCadence,
    /// Trigger-signature key -> pending start, the sole concurrency-control
    /// primitive in this core.
    in_flight: Mutex<HashMap<String, SharedStart>>,
    /// Discussion id -> (generation, timer) for interruption debounce.
    interruption_timers: Mutex<HashMap<String, (u64, AbortHandle)>>,
    timer_generation: AtomicU64,
}

impl DeliberationEngine {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        completion: Arc<dyn CompletionClient>,
        store: Arc<dyn DiscussionStore>,
        jobs: Arc<dyn JobDispatch>,
        config: DeliberationConfig,
    ) -> Self {
        Self {
            gateway,
            completion,
            store,
            jobs,
            config,
            cadence: EmojiCadence::new(),
            in_flight: Mutex::new(HashMap::new()),
            interruption_timers: Mutex::new(HashMap::new()),
            timer_generation: AtomicU64::new(1),
        }
    }

    /// Humanizer cadence state, exposed so embedding code and tests can
    /// reset it.
    pub fn cadence(&self) -> &EmojiCadence {
        &self.cadence
    }

    /// Concurrency-safe discussion entry point: all callers racing on the
    /// same trigger signature observe the same eventual discussion.
    pub async fn start_discussion(
        self: &Arc<Self>,
        trigger: &Trigger,
        personas: &[Persona],
    ) -> Result<Discussion> {
        let key = trigger.signature().key();
        let pending = {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| anyhow!("in-flight registry lock is poisoned"))?;
            if let Some(existing) = in_flight.get(&key) {
                existing.clone()
            } else {
                let engine = Arc::clone(self);
                let trigger = trigger.clone();
                let personas = personas.to_vec();
                let future: SharedStart = async move {
                    engine
                        .start_discussion_inner(trigger, personas)
                        .await
                        .map_err(|error| format!("{error:#}"))
                }
                .boxed()
                .shared();
                in_flight.insert(key.clone(), future.clone());
                future
            }
        };

        let result = pending.await;
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&key);
        }
        result.map_err(|message| anyhow!(message))
    }

    async fn start_discussion_inner(
        &self,
        trigger: Trigger,
        personas: Vec<Persona>,
    ) -> Result<Discussion> {
        let signature = trigger.signature();
        if let Some(existing) = self.store.find_by_signature(&signature).await? {
            if existing.is_active() {
                tracing::debug!(signature = %signature.key(), "discussion already active, reusing");
                return Ok(existing);
            }
            let age = current_unix_timestamp_ms().saturating_sub(existing.updated_unix_ms);
            if age < self.config.replay_guard_ms {
                tracing::debug!(
                    signature = %signature.key(),
                    age_ms = age,
                    "terminal discussion inside replay guard, reusing"
                );
                return Ok(existing);
            }
        }

        let participants = select_participants(trigger.trigger_type, &personas);
        if participants.is_empty() {
            bail!("no personas available to start discussion {}", signature.key());
        }
        let opener = find_persona_by_category(&participants, RoleCategory::Developer)
            .unwrap_or(&participants[0])
            .clone();

        let channel = trigger
            .channel_id
            .clone()
            .unwrap_or_else(|| self.config.home_channel.clone());
        let opening = prompts::opening_message(&trigger);
        let posted = self
            .gateway
            .post_as_persona(&channel, &opening, &opener, None)
            .await
            .context("posting discussion opening")?;

        let mut discussion = Discussion::new(&signature, posted.channel, posted.ts);
        discussion.add_participant(&opener.id);
        self.store.insert(discussion.clone()).await?;
        tracing::debug!(discussion = %discussion.id, signature = %signature.key(), "discussion started");

        let contributors: Vec<Persona> = participants
            .iter()
            .filter(|persona| persona.id != opener.id)
            .cloned()
            .collect();
        self.run_contribution_round(&mut discussion, &contributors, &trigger.context)
            .await?;
        self.evaluate_consensus(&mut discussion, &personas, &contributors, trigger.context)
            .await?;
        Ok(discussion)
    }

    /// One contribution round: contributors post strictly in order, each
    /// separated by the pacing delay. Generation failures are per-persona
    /// skips, never round failures.
    async fn run_contribution_round(
        &self,
        discussion: &mut Discussion,
        contributors: &[Persona],
        context: &str,
    ) -> Result<()> {
        let mut working_history = self
            .fetch_history(
                &discussion.channel_id,
                &discussion.thread_ts,
                self.config.round_history_limit,
            )
            .await;

        for persona in contributors {
            let system = prompts::build_persona_system_prompt(persona);
            let user = prompts::build_contribution_prompt(context, discussion.round, &working_history);
            let generated = match self.completion.generate(&system, &user).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => {
                    tracing::debug!(persona = %persona.id, "empty contribution, skipping");
                    continue;
                }
                Err(error) => {
                    tracing::debug!(persona = %persona.id, %error, "contribution failed, skipping");
                    continue;
                }
            };

            let key = cadence_key(&discussion.channel_id, &discussion.thread_ts, &persona.id);
            let text = humanize(&generated, &self.config.humanize, &self.cadence, &key);
            if text == SKIP_SENTINEL || text.is_empty() {
                continue;
            }
            self.gateway
                .post_as_persona(
                    &discussion.channel_id,
                    &text,
                    persona,
                    Some(&discussion.thread_ts),
                )
                .await
                .context("posting round contribution")?;
            discussion.add_participant(&persona.id);
            discussion.touch();
            self.store.update(discussion).await?;
            working_history.push(ChatMessage {
                author_name: persona.name.clone(),
                text,
            });
            tokio::time::sleep(Duration::from_millis(self.config.inter_post_delay_ms)).await;
        }
        Ok(())
    }

    /// Iterative consensus loop. Runs until the discussion leaves `Active`;
    /// an explicit loop keeps pathological repeated-CHANGES sequences off
    /// the call stack.
    async fn evaluate_consensus(
        &self,
        discussion: &mut Discussion,
        personas: &[Persona],
        contributors: &[Persona],
        mut context: String,
    ) -> Result<()> {
        let Some(lead) = find_persona_by_category(personas, RoleCategory::Lead).cloned() else {
            // Nobody to call consensus and nobody to escalate to.
            discussion.status = DiscussionStatus::Consensus;
            discussion.consensus_result = Some(ConsensusResult::Approved);
            discussion.touch();
            self.store.update(discussion).await?;
            return Ok(());
        };

        while discussion.is_active() {
            let history = self
                .fetch_history(
                    &discussion.channel_id,
                    &discussion.thread_ts,
                    self.config.consensus_history_limit,
                )
                .await;
            let system = prompts::build_persona_system_prompt(&lead);
            let user = prompts::build_consensus_prompt(&context, discussion.round, &history);
            let verdict = match self.completion.generate(&system, &user).await {
                Ok(text) => parse_consensus_verdict(&text),
                Err(error) => {
                    tracing::warn!(discussion = %discussion.id, %error, "consensus call failed");
                    ConsensusVerdict::Unparsable
                }
            };

            match verdict {
                ConsensusVerdict::Approve(message) => {
                    let closing = if message.is_empty() {
                        "Consensus reached, we're good.".to_string()
                    } else {
                        message
                    };
                    self.post_humanized(discussion, &lead, &closing).await?;
                    discussion.status = DiscussionStatus::Consensus;
                    discussion.consensus_result = Some(ConsensusResult::Approved);
                    discussion.touch();
                    self.store.update(discussion).await?;
                }
                ConsensusVerdict::Changes(summary) if discussion.round < self.config.max_rounds => {
                    self.post_humanized(
                        discussion,
                        &lead,
                        &format!("Changes requested: {summary}"),
                    )
                    .await?;
                    discussion.round += 1;
                    discussion.touch();
                    self.store.update(discussion).await?;
                    context = summary;
                    self.run_contribution_round(discussion, contributors, &context)
                        .await?;
                }
                ConsensusVerdict::Changes(summary) => {
                    // Round cap reached: ship anyway with notes.
                    self.post_humanized(
                        discussion,
                        &lead,
                        &format!("We've gone around enough, shipping with notes: {summary}"),
                    )
                    .await?;
                    discussion.status = DiscussionStatus::Consensus;
                    discussion.consensus_result = Some(ConsensusResult::ChangesRequested);
                    discussion.touch();
                    self.store.update(discussion).await?;
                    if discussion.trigger_type == TriggerType::PrReview {
                        self.trigger_followup_review(discussion, &lead, &summary).await;
                    }
                }
                ConsensusVerdict::Human(reason) => {
                    self.escalate_to_human(discussion, &lead, &reason).await?;
                }
                ConsensusVerdict::Unparsable => {
                    self.escalate_to_human(discussion, &lead, "").await?;
                }
            }
        }
        Ok(())
    }

    async fn escalate_to_human(
        &self,
        discussion: &mut Discussion,
        lead: &Persona,
        reason: &str,
    ) -> Result<()> {
        discussion.status = DiscussionStatus::Blocked;
        discussion.consensus_result = Some(ConsensusResult::HumanNeeded);
        discussion.touch();
        self.store.update(discussion).await?;
        let line = if reason.trim().is_empty() {
            "This one needs a human call.".to_string()
        } else {
            format!("This one needs a human call: {}", reason.trim())
        };
        self.post_humanized(discussion, lead, &line).await
    }

    /// Best-effort follow-up review job after a ship-anyway outcome; spawn
    /// failure is logged and swallowed.
    async fn trigger_followup_review(
        &self,
        discussion: &Discussion,
        persona: &Persona,
        feedback: &str,
    ) {
        let project = Project {
            name: discussion
                .project_path
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or(discussion.project_path.as_str())
                .to_string(),
            path: discussion.project_path.clone(),
            channel_id: Some(discussion.channel_id.clone()),
        };
        let mut request = JobRequest::new(JobKind::Review);
        request.pr_number = parse_reference_number(&discussion.trigger_ref);
        request.feedback = Some(feedback.to_string());
        if let Err(error) = self
            .jobs
            .spawn_job(
                request,
                &project,
                &discussion.channel_id,
                Some(&discussion.thread_ts),
                persona,
            )
            .await
        {
            tracing::warn!(discussion = %discussion.id, %error, "follow-up review spawn failed");
        }
    }

    /// Human posted in an active discussion thread: (re)start the debounce
    /// timer; when it fires uninterrupted, the lead picks the thread back
    /// up and consensus re-runs.
    pub async fn handle_human_message(
        self: &Arc<Self>,
        channel: &str,
        thread_ts: &str,
        _text: &str,
        _user_id: &str,
        personas: &[Persona],
    ) -> Result<()> {
        let Some(discussion) = self.store.find_by_thread(channel, thread_ts).await? else {
            return Ok(());
        };
        if !discussion.is_active() {
            return Ok(());
        }

        let generation = self.timer_generation.fetch_add(1, Ordering::Relaxed);
        let engine = Arc::clone(self);
        let discussion_id = discussion.id.clone();
        let channel = channel.to_string();
        let thread_ts = thread_ts.to_string();
        let personas = personas.to_vec();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(engine.config.interruption_debounce_ms)).await;
            {
                let Ok(mut timers) = engine.interruption_timers.lock() else {
                    return;
                };
                match timers.get(&discussion_id) {
                    Some((current, _)) if *current == generation => {
                        timers.remove(&discussion_id);
                    }
                    // Superseded by a newer human message.
                    _ => return,
                }
            }
            if let Err(error) = engine
                .resume_after_interruption(&channel, &thread_ts, &personas)
                .await
            {
                tracing::warn!(%error, "resume after human interruption failed");
            }
        });

        let mut timers = self
            .interruption_timers
            .lock()
            .map_err(|_| anyhow!("interruption timer lock is poisoned"))?;
        if let Some((_, previous)) =
            timers.insert(discussion.id.clone(), (generation, handle.abort_handle()))
        {
            previous.abort();
        }
        Ok(())
    }

    async fn resume_after_interruption(
        &self,
        channel: &str,
        thread_ts: &str,
        personas: &[Persona],
    ) -> Result<()> {
        let Some(mut discussion) = self.store.find_by_thread(channel, thread_ts).await? else {
            return Ok(());
        };
        if !discussion.is_active() {
            return Ok(());
        }
        if let Some(lead) = find_persona_by_category(personas, RoleCategory::Lead) {
            let lead = lead.clone();
            self.post_humanized(&discussion, &lead, "Picking this back up.")
                .await?;
        }
        let contributors: Vec<Persona> = personas
            .iter()
            .filter(|persona| {
                discussion.participants.iter().any(|id| id == &persona.id)
                    && find_persona_by_category(personas, RoleCategory::Lead)
                        .map(|lead| lead.id != persona.id)
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        let context = discussion.trigger_ref.clone();
        self.evaluate_consensus(&mut discussion, personas, &contributors, context)
            .await
    }

    /// Ad-hoc in-thread reply outside any formal discussion. Returns the
    /// posted text, or `None` when the persona had nothing to say.
    pub async fn reply_as_agent(
        &self,
        channel: &str,
        thread_ts: &str,
        incoming_text: &str,
        persona: &Persona,
        context: &str,
    ) -> Result<Option<String>> {
        let history = self
            .fetch_history(channel, thread_ts, self.config.round_history_limit)
            .await;
        let system = prompts::build_persona_system_prompt(persona);
        let user = prompts::build_reply_prompt(incoming_text, context, &history);
        let generated = match self.completion.generate(&system, &user).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => return Ok(None),
            Err(error) => {
                tracing::debug!(persona = %persona.id, %error, "ad-hoc reply generation failed");
                return Ok(None);
            }
        };
        let key = cadence_key(channel, thread_ts, &persona.id);
        let text = humanize(&generated, &self.config.humanize, &self.cadence, &key);
        if text == SKIP_SENTINEL || text.is_empty() {
            return Ok(None);
        }
        self.gateway
            .post_as_persona(channel, &text, persona, Some(thread_ts))
            .await
            .context("posting ad-hoc reply")?;
        Ok(Some(text))
    }

    async fn post_humanized(
        &self,
        discussion: &Discussion,
        persona: &Persona,
        text: &str,
    ) -> Result<()> {
        let key = cadence_key(&discussion.channel_id, &discussion.thread_ts, &persona.id);
        let text = humanize(text, &self.config.humanize, &self.cadence, &key);
        if text == SKIP_SENTINEL || text.is_empty() {
            return Ok(());
        }
        self.gateway
            .post_as_persona(
                &discussion.channel_id,
                &text,
                persona,
                Some(&discussion.thread_ts),
            )
            .await
            .context("posting discussion message")?;
        Ok(())
    }

    /// History fetch degrades to an empty window on transport failure.
    async fn fetch_history(&self, channel: &str, thread_ts: &str, limit: usize) -> Vec<ChatMessage> {
        match self.gateway.channel_history(channel, thread_ts, limit).await {
            Ok(history) => history,
            Err(error) => {
                tracing::warn!(%error, "history fetch failed, using empty context");
                Vec::new()
            }
        }
    }
}

/// Role-based participant selection per trigger type, falling back to the
/// first available persona when no role matches.
fn select_participants(trigger_type: TriggerType, personas: &[Persona]) -> Vec<Persona> {
    let categories: &[RoleCategory] = match trigger_type {
        TriggerType::PrReview => &[
            RoleCategory::Developer,
            RoleCategory::Lead,
            RoleCategory::Security,
            RoleCategory::Quality,
        ],
        TriggerType::BuildFailure | TriggerType::PrdKickoff => {
            &[RoleCategory::Developer, RoleCategory::Lead]
        }
        TriggerType::Other => &[RoleCategory::Lead],
    };

    let mut selected: Vec<Persona> = Vec::new();
    for category in categories {
        if let Some(persona) = find_persona_by_category(personas, *category) {
            if !selected.iter().any(|existing| existing.id == persona.id) {
                selected.push(persona.clone());
            }
        }
    }
    if selected.is_empty() {
        if let Some(first) = personas.first() {
            selected.push(first.clone());
        }
    }
    selected
}
