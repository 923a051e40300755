//! Trigger resolution for inbound chat messages.
//!
//! One inbound message resolves to at most one trigger; the checks run in a
//! strict priority order and the first hit consumes the message. A `false`
//! return means the caller may hand the message to the ambient cascade.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::classify::{
    detect_job_kind, detect_provider, is_pickup_request, parse_project_hint,
    parse_provider_request, wants_conflict_resolution, Classifier, IssueRef,
};
use quorum_contract::{
    find_persona_by_category, ChatGateway, JobDispatch, JobKind, JobRequest, Persona, Project,
    RoleCategory, ThreadState, Trigger, TriggerType,
};
use quorum_core::{starts_with_token_ci, truncate_with_ellipsis};
use quorum_deliberation::DeliberationEngine;

const DEFAULT_PROMPT_PREVIEW_CHARS: usize = 120;
const DEFAULT_ACK_MAX_CHARS: usize = 280;
const DEFAULT_MIN_HUMAN_DELAY_MS: u64 = 1_200;
const DEFAULT_MAX_HUMAN_DELAY_MS: u64 = 3_500;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Router tunables: bot identity and acknowledgement shaping.
pub struct RouterConfig {
    pub bot_name: String,
    pub bot_abbreviation: String,
    /// Prompt preview cap inside acknowledgements.
    pub prompt_preview_chars: usize,
    /// Hard cap on a rendered acknowledgement.
    pub ack_max_chars: usize,
    pub min_human_delay_ms: u64,
    pub max_human_delay_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bot_name: "Night Watch".to_string(),
            bot_abbreviation: "NW".to_string(),
            prompt_preview_chars: DEFAULT_PROMPT_PREVIEW_CHARS,
            ack_max_chars: DEFAULT_ACK_MAX_CHARS,
            min_human_delay_ms: DEFAULT_MIN_HUMAN_DELAY_MS,
            max_human_delay_ms: DEFAULT_MAX_HUMAN_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone)]
/// One inbound chat message as the ingestion layer hands it over.
pub struct InboundMessage {
    pub text: String,
    /// True for an explicit app-mention event.
    pub is_mention: bool,
    /// Parent thread when the message is a threaded reply; `None` for a
    /// channel-root message.
    pub parent_thread_ts: Option<String>,
}

enum ProjectResolution<'a> {
    Resolved(&'a Project),
    Ambiguous,
    NoneRegistered,
}

/// Decides which single trigger, if any, an inbound message fires.
pub struct MessageRouter {
    gateway: Arc<dyn ChatGateway>,
    jobs: Arc<dyn JobDispatch>,
    engine: Arc<DeliberationEngine>,
    thread_state: Arc<ThreadState>,
    config: RouterConfig,
    classifier: Classifier,
}

impl MessageRouter {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        jobs: Arc<dyn JobDispatch>,
        engine: Arc<DeliberationEngine>,
        thread_state: Arc<ThreadState>,
        config: RouterConfig,
    ) -> Result<Self> {
        Ok(Self {
            gateway,
            jobs,
            engine,
            thread_state,
            config,
            classifier: Classifier::new().context("building message classifier")?,
        })
    }

    /// Returns `true` iff a trigger fired and the caller should suppress
    /// further handling of this message.
    pub async fn try_route(
        &self,
        message: &InboundMessage,
        channel: &str,
        thread_ts: &str,
        _message_ts: &str,
        personas: &[Persona],
        projects: &[Project],
    ) -> Result<bool> {
        let addressed = self.is_addressed_to_bot(message);

        // Pickup phrasing outranks the bare-URL review trigger, so an issue
        // URL inside a pickup request never double-fires.
        let pickup = is_pickup_request(&message.text, addressed);

        if !pickup && message.parent_thread_ts.is_none() {
            if let Some(issue) = self.classifier.extract_issue_ref(&message.text) {
                if self.try_issue_review(&issue, channel, personas, projects) {
                    return Ok(true);
                }
                return Ok(false);
            }
        }

        if let Some(provider) = detect_provider(&message.text) {
            let provider_addressed =
                addressed || starts_with_token_ci(&message.text, provider.keyword());
            if provider_addressed {
                if let Some(request) = parse_provider_request(&message.text, provider) {
                    return self
                        .route_provider_request(request, channel, thread_ts, personas, projects)
                        .await;
                }
            }
        }

        if addressed {
            if let Some(kind) = detect_job_kind(&message.text) {
                return self
                    .route_job_request(kind, message, channel, thread_ts, personas, projects)
                    .await;
            }
        }

        if pickup {
            return self
                .route_issue_pickup(message, channel, thread_ts, personas, projects)
                .await;
        }

        Ok(false)
    }

    /// Explicit mention event, or a message that begins with the bot's name
    /// or abbreviation as a whole token.
    pub fn is_addressed_to_bot(&self, message: &InboundMessage) -> bool {
        message.is_mention
            || starts_with_token_ci(&message.text, &self.config.bot_name)
            || starts_with_token_ci(&message.text, &self.config.bot_abbreviation)
    }

    /// Fire-and-forget review discussion for a bare issue URL. Returns
    /// `false` without side effects when the URL is on cooldown or matches no
    /// registered project.
    fn try_issue_review(
        &self,
        issue: &IssueRef,
        channel: &str,
        personas: &[Persona],
        projects: &[Project],
    ) -> bool {
        if self.thread_state.is_issue_on_cooldown(&issue.url) {
            tracing::debug!(url = %issue.url, "issue review on cooldown, skipping");
            return false;
        }
        let Some(project) = projects.iter().find(|project| project.repo_slug() == issue.repo)
        else {
            return false;
        };

        let trigger = Trigger {
            trigger_type: TriggerType::PrReview,
            project_path: project.path.clone(),
            reference: issue.url.clone(),
            context: format!("Review requested for {}", issue.url),
            channel_id: project
                .channel_id
                .clone()
                .or_else(|| Some(channel.to_string())),
        };
        self.thread_state.mark_issue_reviewed(&issue.url);

        let engine = Arc::clone(&self.engine);
        let personas = personas.to_vec();
        tokio::spawn(async move {
            if let Err(error) = engine.start_discussion(&trigger, &personas).await {
                tracing::warn!(reference = %trigger.reference, %error, "issue review discussion failed");
            }
        });
        true
    }

    async fn route_provider_request(
        &self,
        request: crate::classify::ProviderRequest,
        channel: &str,
        thread_ts: &str,
        personas: &[Persona],
        projects: &[Project],
    ) -> Result<bool> {
        let Some(persona) = personas.first() else {
            return Ok(false);
        };
        let project =
            match self.resolve_project(request.project_hint.as_deref(), channel, projects) {
                ProjectResolution::Resolved(project) => project,
                ProjectResolution::Ambiguous => {
                    return self.ask_which_project(channel, thread_ts, persona).await;
                }
                ProjectResolution::NoneRegistered => return Ok(false),
            };

        self.human_delay().await;
        let preview = truncate_with_ellipsis(&request.prompt, self.config.prompt_preview_chars);
        let ack = truncate_with_ellipsis(
            &format!(
                "On it, sending this to {}: \"{preview}\"",
                request.provider.as_str()
            ),
            self.config.ack_max_chars,
        );
        self.gateway
            .post_as_persona(channel, &ack, persona, Some(thread_ts))
            .await
            .context("posting provider acknowledgement")?;
        self.jobs
            .spawn_direct_provider_request(
                &request.prompt,
                request.provider,
                project,
                channel,
                Some(thread_ts),
                persona,
            )
            .await
            .context("spawning direct provider request")?;
        Ok(true)
    }

    async fn route_job_request(
        &self,
        kind: JobKind,
        message: &InboundMessage,
        channel: &str,
        thread_ts: &str,
        personas: &[Persona],
        projects: &[Project],
    ) -> Result<bool> {
        let persona = match kind {
            JobKind::Qa => find_persona_by_category(personas, RoleCategory::Quality),
            JobKind::Review => find_persona_by_category(personas, RoleCategory::Lead),
            JobKind::Run => None,
        }
        .or_else(|| personas.first());
        let Some(persona) = persona else {
            return Ok(false);
        };

        let hint = parse_project_hint(&message.text);
        let project = match self.resolve_project(hint.as_deref(), channel, projects) {
            ProjectResolution::Resolved(project) => project,
            ProjectResolution::Ambiguous => {
                return self.ask_which_project(channel, thread_ts, persona).await;
            }
            ProjectResolution::NoneRegistered => return Ok(false),
        };

        let mut request = JobRequest::new(kind);
        request.pr_number = self.classifier.extract_pr_number(&message.text);
        request.resolve_conflicts = wants_conflict_resolution(&message.text);

        self.human_delay().await;
        let ack = format!(
            "On it, kicking off a {} job for {}.",
            kind.as_str(),
            project.name
        );
        self.gateway
            .post_as_persona(channel, &ack, persona, Some(thread_ts))
            .await
            .context("posting job acknowledgement")?;
        self.jobs
            .spawn_job(request, project, channel, Some(thread_ts), persona)
            .await
            .context("spawning job")?;
        Ok(true)
    }

    async fn route_issue_pickup(
        &self,
        message: &InboundMessage,
        channel: &str,
        thread_ts: &str,
        personas: &[Persona],
        projects: &[Project],
    ) -> Result<bool> {
        let Some(persona) = personas.first() else {
            return Ok(false);
        };
        let Some(issue) = self.classifier.extract_issue_ref(&message.text) else {
            return Ok(false);
        };
        let Some(project) = projects.iter().find(|project| project.repo_slug() == issue.repo)
        else {
            return self.ask_which_project(channel, thread_ts, persona).await;
        };

        self.human_delay().await;
        let ack = format!("Picking up issue #{}, I'll take this one.", issue.number);
        self.gateway
            .post_as_persona(channel, &ack, persona, Some(thread_ts))
            .await
            .context("posting pickup acknowledgement")?;
        self.thread_state
            .remember_ad_hoc_thread_persona(channel, thread_ts, &persona.id);

        let mut request = JobRequest::new(JobKind::Run);
        request.issue_number = Some(issue.number);
        self.jobs
            .spawn_job(request, project, channel, Some(thread_ts), persona)
            .await
            .context("spawning pickup job")?;
        Ok(true)
    }

    async fn ask_which_project(
        &self,
        channel: &str,
        thread_ts: &str,
        persona: &Persona,
    ) -> Result<bool> {
        self.gateway
            .post_as_persona(
                channel,
                "Which project? I can see a few candidates here.",
                persona,
                Some(thread_ts),
            )
            .await
            .context("posting project clarification")?;
        Ok(true)
    }

    fn resolve_project<'a>(
        &self,
        hint: Option<&str>,
        channel: &str,
        projects: &'a [Project],
    ) -> ProjectResolution<'a> {
        if projects.is_empty() {
            return ProjectResolution::NoneRegistered;
        }
        if let Some(project) = hint.and_then(|hint| resolve_project_by_hint(hint, projects)) {
            return ProjectResolution::Resolved(project);
        }
        if let Some(project) = projects
            .iter()
            .find(|project| project.channel_id.as_deref() == Some(channel))
        {
            return ProjectResolution::Resolved(project);
        }
        if projects.len() == 1 {
            return ProjectResolution::Resolved(&projects[0]);
        }
        ProjectResolution::Ambiguous
    }

    async fn human_delay(&self) {
        let delay = self
            .thread_state
            .random_int(self.config.min_human_delay_ms, self.config.max_human_delay_ms);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

/// Case-insensitive exact name match first, then substring containment in
/// the display name or the path's final segment.
pub fn resolve_project_by_hint<'a>(hint: &str, projects: &'a [Project]) -> Option<&'a Project> {
    let hint = hint.trim().to_lowercase();
    if hint.is_empty() {
        return None;
    }
    if let Some(project) = projects
        .iter()
        .find(|project| project.name.to_lowercase() == hint)
    {
        return Some(project);
    }
    projects.iter().find(|project| {
        project.name.to_lowercase().contains(&hint) || project.repo_slug().contains(&hint)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex as AsyncMutex;

    use super::{resolve_project_by_hint, InboundMessage, MessageRouter, RouterConfig};
    use anyhow::Result;
    use quorum_contract::{
        ChatGateway, ChatMessage, CompletionClient, CompletionError, InMemoryDiscussionStore,
        JobKind, JobRequest, Persona, PostedMessage, Project, ProviderKind, ThreadState,
    };
    use quorum_deliberation::{DeliberationConfig, DeliberationEngine};

    fn persona(id: &str, name: &str, role: &str) -> Persona {
        Persona {
            id: id.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            soul: String::new(),
        }
    }

    fn roster() -> Vec<Persona> {
        vec![
            persona("dev", "Dev", "developer"),
            persona("carlos", "Carlos", "tech lead"),
            persona("priya", "Priya", "QA engineer"),
        ]
    }

    fn project(name: &str, path: &str, channel: Option<&str>) -> Project {
        Project {
            name: name.to_string(),
            path: path.to_string(),
            channel_id: channel.map(str::to_string),
        }
    }

    fn root_message(text: &str) -> InboundMessage {
        InboundMessage {
            text: text.to_string(),
            is_mention: false,
            parent_thread_ts: None,
        }
    }

    fn mention(text: &str) -> InboundMessage {
        InboundMessage {
            is_mention: true,
            ..root_message(text)
        }
    }

    #[derive(Debug, Clone)]
    struct RecordedPost {
        text: String,
        persona_id: String,
    }

    struct RecordingGateway {
        posts: AsyncMutex<Vec<RecordedPost>>,
        ts_counter: AtomicU64,
    }

    impl RecordingGateway {
        fn new() -> Self {
            Self {
                posts: AsyncMutex::new(Vec::new()),
                ts_counter: AtomicU64::new(1),
            }
        }
    }

    #[async_trait]
    impl ChatGateway for RecordingGateway {
        async fn post_as_persona(
            &self,
            channel: &str,
            text: &str,
            persona: &Persona,
            _thread_ts: Option<&str>,
        ) -> Result<PostedMessage> {
            self.posts.lock().await.push(RecordedPost {
                text: text.to_string(),
                persona_id: persona.id.clone(),
            });
            Ok(PostedMessage {
                channel: channel.to_string(),
                ts: format!("171.{:03}", self.ts_counter.fetch_add(1, Ordering::Relaxed)),
            })
        }

        async fn channel_history(
            &self,
            _channel: &str,
            _thread_ts: &str,
            _limit: usize,
        ) -> Result<Vec<ChatMessage>> {
            Ok(Vec::new())
        }

        async fn add_reaction(&self, _channel: &str, _ts: &str, _emoji: &str) -> Result<()> {
            Ok(())
        }
    }

    struct SilentCompletion;

    #[async_trait]
    impl CompletionClient for SilentCompletion {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, CompletionError> {
            Err(CompletionError::Provider("not scripted".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingJobs {
        jobs: AsyncMutex<Vec<(JobRequest, String, String)>>,
        directs: AsyncMutex<Vec<(String, ProviderKind, String)>>,
    }

    #[async_trait]
    impl quorum_contract::JobDispatch for RecordingJobs {
        async fn spawn_job(
            &self,
            request: JobRequest,
            project: &Project,
            _channel: &str,
            _thread_ts: Option<&str>,
            persona: &Persona,
        ) -> Result<()> {
            self.jobs
                .lock()
                .await
                .push((request, project.name.clone(), persona.id.clone()));
            Ok(())
        }

        async fn spawn_direct_provider_request(
            &self,
            prompt: &str,
            provider: ProviderKind,
            project: &Project,
            _channel: &str,
            _thread_ts: Option<&str>,
            _persona: &Persona,
        ) -> Result<()> {
            self.directs
                .lock()
                .await
                .push((prompt.to_string(), provider, project.name.clone()));
            Ok(())
        }
    }

    struct Harness {
        router: MessageRouter,
        gateway: Arc<RecordingGateway>,
        jobs: Arc<RecordingJobs>,
        thread_state: Arc<ThreadState>,
    }

    fn harness() -> Harness {
        let gateway = Arc::new(RecordingGateway::new());
        let jobs = Arc::new(RecordingJobs::default());
        let thread_state = Arc::new(ThreadState::default());
        let engine = Arc::new(DeliberationEngine::new(
            gateway.clone(),
            Arc::new(SilentCompletion),
            Arc::new(InMemoryDiscussionStore::new()),
            jobs.clone(),
            DeliberationConfig::default(),
        ));
        let router = MessageRouter::new(
            gateway.clone(),
            jobs.clone(),
            engine,
            thread_state.clone(),
            RouterConfig::default(),
        )
        .expect("router");
        Harness {
            router,
            gateway,
            jobs,
            thread_state,
        }
    }

    #[test]
    fn unit_resolve_project_by_hint_prefers_exact_name() {
        let projects = vec![
            project("Night Watch", "/srv/night-watch", None),
            project("watchtower", "/srv/watchtower", None),
        ];
        let exact = resolve_project_by_hint("night watch", &projects).expect("exact");
        assert_eq!(exact.name, "Night Watch");
        let substring = resolve_project_by_hint("tower", &projects).expect("substring");
        assert_eq!(substring.name, "watchtower");
        assert!(resolve_project_by_hint("  ", &projects).is_none());
        assert!(resolve_project_by_hint("zephyr", &projects).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unit_addressed_to_bot_requires_leading_token() {
        let harness = harness();
        assert!(harness.router.is_addressed_to_bot(&root_message("NW run tests")));
        assert!(harness
            .router
            .is_addressed_to_bot(&root_message("night watch, take a look")));
        assert!(!harness
            .router
            .is_addressed_to_bot(&root_message("I asked night watch to help")));
        assert!(harness.router.is_addressed_to_bot(&mention("anything")));
    }

    #[tokio::test(start_paused = true)]
    async fn regression_bare_issue_url_outranks_job_keywords() {
        let harness = harness();
        let projects = vec![project("Night Watch", "/srv/night-watch", Some("C1"))];
        // "review" would match the job trigger; the URL must win.
        let message = mention("please review https://github.com/acme/night-watch/issues/12");
        let routed = harness
            .router
            .try_route(&message, "C1", "171.000", "171.000", &roster(), &projects)
            .await
            .expect("route");
        assert!(routed);
        assert!(harness.jobs.jobs.lock().await.is_empty(), "no job spawned");
        assert!(harness
            .thread_state
            .is_issue_on_cooldown("https://github.com/acme/night-watch/issues/12"));
    }

    #[tokio::test(start_paused = true)]
    async fn regression_threaded_issue_url_is_not_a_review_trigger() {
        let harness = harness();
        let projects = vec![project("Night Watch", "/srv/night-watch", Some("C1"))];
        let message = InboundMessage {
            parent_thread_ts: Some("171.000".to_string()),
            ..root_message("https://github.com/acme/night-watch/issues/12")
        };
        let routed = harness
            .router
            .try_route(&message, "C1", "171.000", "171.001", &roster(), &projects)
            .await
            .expect("route");
        assert!(!routed);
        assert!(!harness
            .thread_state
            .is_issue_on_cooldown("https://github.com/acme/night-watch/issues/12"));
    }

    #[tokio::test(start_paused = true)]
    async fn regression_issue_review_cooldown_suppresses_retrigger() {
        let harness = harness();
        let projects = vec![project("Night Watch", "/srv/night-watch", Some("C1"))];
        let message = root_message("https://github.com/acme/night-watch/issues/12");
        let first = harness
            .router
            .try_route(&message, "C1", "171.000", "171.000", &roster(), &projects)
            .await
            .expect("route");
        assert!(first);
        let second = harness
            .router
            .try_route(&message, "C1", "171.010", "171.010", &roster(), &projects)
            .await
            .expect("route");
        assert!(!second);
    }

    #[tokio::test(start_paused = true)]
    async fn functional_unknown_repo_issue_url_is_a_noop() {
        let harness = harness();
        let projects = vec![project("Night Watch", "/srv/night-watch", Some("C1"))];
        let message = root_message("https://github.com/acme/other-repo/issues/3");
        let routed = harness
            .router
            .try_route(&message, "C1", "171.000", "171.000", &roster(), &projects)
            .await
            .expect("route");
        assert!(!routed);
        assert!(harness.gateway.posts.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn functional_provider_request_ambiguity_asks_for_project() {
        let harness = harness();
        let projects = vec![
            project("Night Watch", "/srv/night-watch", None),
            project("watchtower", "/srv/watchtower", None),
        ];
        let message = root_message("claude: refactor the cache layer");
        let routed = harness
            .router
            .try_route(&message, "C9", "171.000", "171.000", &roster(), &projects)
            .await
            .expect("route");
        assert!(routed, "ambiguity still consumes the trigger");
        let posts = harness.gateway.posts.lock().await;
        assert_eq!(posts.len(), 1);
        assert!(posts[0].text.contains("Which project"));
        assert!(harness.jobs.directs.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn functional_provider_request_spawns_direct_job_with_preview() {
        let harness = harness();
        let projects = vec![project("Night Watch", "/srv/night-watch", None)];
        let long_prompt = "p".repeat(200);
        let message = root_message(&format!("claude: {long_prompt}"));
        let routed = harness
            .router
            .try_route(&message, "C9", "171.000", "171.000", &roster(), &projects)
            .await
            .expect("route");
        assert!(routed);

        let posts = harness.gateway.posts.lock().await;
        assert_eq!(posts.len(), 1);
        assert!(posts[0].text.contains("claude"));
        assert!(posts[0].text.contains("..."), "long prompt preview is cut");
        assert!(posts[0].text.chars().count() <= 280 + 3);

        let directs = harness.jobs.directs.lock().await;
        assert_eq!(directs.len(), 1);
        assert_eq!(directs[0].0, long_prompt, "full prompt reaches the job");
        assert_eq!(directs[0].1, ProviderKind::Claude);
        assert_eq!(directs[0].2, "Night Watch");
    }

    #[tokio::test(start_paused = true)]
    async fn functional_provider_hint_resolves_project() {
        let harness = harness();
        let projects = vec![
            project("Night Watch", "/srv/night-watch", None),
            project("watchtower", "/srv/watchtower", None),
        ];
        let message = root_message("claude on watchtower: check the alert rules");
        let routed = harness
            .router
            .try_route(&message, "C9", "171.000", "171.000", &roster(), &projects)
            .await
            .expect("route");
        assert!(routed);
        let directs = harness.jobs.directs.lock().await;
        assert_eq!(directs.len(), 1);
        assert_eq!(directs[0].2, "watchtower");
    }

    #[tokio::test(start_paused = true)]
    async fn functional_qa_job_request_prefers_quality_persona() {
        let harness = harness();
        let projects = vec![project("Night Watch", "/srv/night-watch", None)];
        let message = root_message("NW run the qa suite on night-watch");
        let routed = harness
            .router
            .try_route(&message, "C1", "171.000", "171.000", &roster(), &projects)
            .await
            .expect("route");
        assert!(routed);

        let jobs = harness.jobs.jobs.lock().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].0.kind, JobKind::Qa);
        assert_eq!(jobs[0].2, "priya", "QA persona acknowledges QA jobs");
    }

    #[tokio::test(start_paused = true)]
    async fn functional_review_job_extracts_pr_number_and_conflict_flag() {
        let harness = harness();
        let projects = vec![project("Night Watch", "/srv/night-watch", None)];
        let message = mention(
            "review https://github.com/acme/night-watch/pull/42, it has a merge conflict",
        );
        let routed = harness
            .router
            .try_route(&message, "C1", "171.000", "171.000", &roster(), &projects)
            .await
            .expect("route");
        assert!(routed);

        let jobs = harness.jobs.jobs.lock().await;
        assert_eq!(jobs.len(), 1);
        let (request, _, persona_id) = &jobs[0];
        assert_eq!(request.kind, JobKind::Review);
        assert_eq!(request.pr_number, Some(42));
        assert!(request.resolve_conflicts);
        assert_eq!(persona_id, "carlos", "lead acknowledges review jobs");
    }

    #[tokio::test(start_paused = true)]
    async fn functional_pickup_spawns_run_job_and_remembers_owner() {
        let harness = harness();
        let projects = vec![project("Night Watch", "/srv/night-watch", None)];
        let message = mention("pick up https://github.com/acme/night-watch/issues/7");
        let routed = harness
            .router
            .try_route(&message, "C1", "171.000", "171.000", &roster(), &projects)
            .await
            .expect("route");
        assert!(routed);

        let posts = harness.gateway.posts.lock().await;
        assert_eq!(posts.len(), 1);
        assert!(posts[0].text.contains("#7"));

        let jobs = harness.jobs.jobs.lock().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].0.kind, JobKind::Run);
        assert_eq!(jobs[0].0.issue_number, Some(7));

        let owner = harness
            .thread_state
            .get_remembered_ad_hoc_persona("C1", "171.000", &roster())
            .expect("owner remembered");
        assert_eq!(owner.id, "dev");
    }

    #[tokio::test(start_paused = true)]
    async fn functional_team_pickup_phrasing_works_without_mention() {
        let harness = harness();
        let projects = vec![project("Night Watch", "/srv/night-watch", None)];
        let message =
            root_message("can someone pick up https://github.com/acme/night-watch/issues/9?");
        let routed = harness
            .router
            .try_route(&message, "C1", "171.000", "171.000", &roster(), &projects)
            .await
            .expect("route");
        assert!(routed);
        assert_eq!(harness.jobs.jobs.lock().await[0].0.issue_number, Some(9));
    }

    #[tokio::test(start_paused = true)]
    async fn functional_plain_chatter_matches_nothing() {
        let harness = harness();
        let projects = vec![project("Night Watch", "/srv/night-watch", None)];
        let message = root_message("lunch at noon?");
        let routed = harness
            .router
            .try_route(&message, "C1", "171.000", "171.000", &roster(), &projects)
            .await
            .expect("route");
        assert!(!routed);
        assert!(harness.gateway.posts.lock().await.is_empty());
        assert!(harness.jobs.jobs.lock().await.is_empty());
    }
}
