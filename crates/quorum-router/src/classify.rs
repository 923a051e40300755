//! Keyword and URL classification behind the router's trigger decisions.
//!
//! Everything here is plain text inspection; no collaborator ever gets
//! called from this module.

use anyhow::{Context, Result};
use regex::Regex;

use quorum_contract::{JobKind, ProviderKind};
use quorum_core::{contains_whole_word_ci, find_whole_word_ci};

#[derive(Debug, Clone, PartialEq, Eq)]
/// A GitHub issue reference pulled out of message text.
pub struct IssueRef {
    pub url: String,
    pub repo: String,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Parsed `"<provider> [on <project>:] <prompt>"` request.
pub struct ProviderRequest {
    pub provider: ProviderKind,
    pub project_hint: Option<String>,
    pub prompt: String,
}

/// Compiled URL patterns shared by the trigger checks.
pub struct Classifier {
    issue_url: Regex,
    pr_url: Regex,
}

impl Classifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            issue_url: Regex::new(r"https://github\.com/([\w.-]+)/([\w.-]+)/issues/(\d+)")
                .context("compiling issue URL pattern")?,
            pr_url: Regex::new(r"https://github\.com/[\w.-]+/[\w.-]+/pull/(\d+)")
                .context("compiling PR URL pattern")?,
        })
    }

    /// First issue URL in the text, with its repository slug and number.
    pub fn extract_issue_ref(&self, text: &str) -> Option<IssueRef> {
        let captures = self.issue_url.captures(text)?;
        Some(IssueRef {
            url: captures.get(0)?.as_str().to_string(),
            repo: captures.get(2)?.as_str().to_lowercase(),
            number: captures.get(3)?.as_str().parse().ok()?,
        })
    }

    /// PR number from the first PR URL in the text.
    pub fn extract_pr_number(&self, text: &str) -> Option<u64> {
        let captures = self.pr_url.captures(text)?;
        captures.get(1)?.as_str().parse().ok()
    }
}

/// First provider named as a whole word in the text.
pub fn detect_provider(text: &str) -> Option<ProviderKind> {
    [ProviderKind::Claude, ProviderKind::Gemini]
        .into_iter()
        .find(|provider| contains_whole_word_ci(text, provider.keyword()))
}

/// Splits a provider request into its optional project hint and the prompt.
///
/// Accepts `"claude on night-watch: do the thing"` as well as the bare
/// `"claude: do the thing"` / `"@bot claude do the thing"` forms. Returns
/// `None` when no prompt text remains after the provider keyword.
pub fn parse_provider_request(text: &str, provider: ProviderKind) -> Option<ProviderRequest> {
    let (_, keyword_end) = find_whole_word_ci(text, provider.keyword())?;
    let after = text[keyword_end..].trim_start();
    let after = after.strip_prefix(':').unwrap_or(after).trim_start();

    let (project_hint, prompt) = if let Some(rest) = strip_leading_word_ci(after, "on") {
        if let Some((hint, prompt)) = rest.split_once(':') {
            (non_empty(hint.trim()), prompt.trim())
        } else {
            (None, after)
        }
    } else {
        (None, after)
    };

    let prompt = prompt.trim();
    if prompt.is_empty() {
        return None;
    }
    Some(ProviderRequest {
        provider,
        project_hint,
        prompt: prompt.to_string(),
    })
}

/// Job intent, most specific keyword first so "run the qa suite" dispatches
/// a QA job.
pub fn detect_job_kind(text: &str) -> Option<JobKind> {
    if contains_whole_word_ci(text, "qa") {
        return Some(JobKind::Qa);
    }
    if contains_whole_word_ci(text, "review") {
        return Some(JobKind::Review);
    }
    if contains_whole_word_ci(text, "run") {
        return Some(JobKind::Run);
    }
    None
}

/// Trailing `"on <project>"` hint in a job request, if any.
pub fn parse_project_hint(text: &str) -> Option<String> {
    let (_, hint_start) = find_whole_word_ci(text, "on")?;
    let rest = text[hint_start..].trim();
    let rest = rest.split(':').next().unwrap_or(rest).trim();
    non_empty(rest)
}

/// Pickup phrasing: an explicit request directed at the bot, or the
/// team-request form anyone can use.
pub fn is_pickup_request(text: &str, addressed_to_bot: bool) -> bool {
    let lowered = text.to_lowercase();
    if !lowered.contains("pick up") {
        return false;
    }
    addressed_to_bot
        || lowered.contains("can someone pick up")
        || lowered.contains("can anyone pick up")
}

pub fn wants_conflict_resolution(text: &str) -> bool {
    text.to_lowercase().contains("merge conflict")
}

fn strip_leading_word_ci<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let (start, end) = find_whole_word_ci(text, word)?;
    if start != 0 {
        return None;
    }
    if text[end..].chars().next().is_some_and(|ch| !ch.is_whitespace()) {
        return None;
    }
    Some(text[end..].trim_start())
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
