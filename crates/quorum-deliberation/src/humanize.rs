//! Output humanization: every generated message passes through here before
//! posting.
//!
//! Strips assistant-sounding artifacts (markdown scaffolding, canned
//! openers, duplicated sentences), enforces a per-thread emoji cadence, and
//! bounds length. A literal `SKIP` sentinel passes through untouched so
//! callers can signal "say nothing".

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Deserialize;

use quorum_core::truncate_with_ellipsis;

/// Sentinel a generation may return to decline contributing.
pub const SKIP_SENTINEL: &str = "SKIP";

const CANNED_OPENERS: &[&str] = &[
    "Great question",
    "Of course",
    "Certainly",
    "You're absolutely right",
    "I hope this helps",
];

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
/// Humanizer tunables.
pub struct HumanizeConfig {
    /// Sentence cap applied before the character budget.
    pub max_sentences: usize,
    /// Hard character budget; overruns end in an ellipsis.
    pub max_chars: usize,
    /// An emoji survives only on every Nth message per cadence key.
    pub emoji_every: u64,
    /// A non-facial emoji survives only on every Mth message.
    pub non_facial_every: u64,
}

impl Default for HumanizeConfig {
    fn default() -> Self {
        Self {
            max_sentences: 4,
            max_chars: 600,
            emoji_every: 3,
            non_facial_every: 9,
        }
    }
}

/// Per-`(channel, thread, persona)` message counters backing the emoji
/// cadence. Owned state, injectable so tests reset it and engines never
/// share counters by accident.
#[derive(Default)]
pub struct EmojiCadence {
    counters: Mutex<HashMap<String, u64>>,
}

impl EmojiCadence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments and returns the counter for the key. First message is 1.
    fn next(&self, key: &str) -> u64 {
        let Ok(mut counters) = self.counters.lock() else {
            return 1;
        };
        let entry = counters.entry(key.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn reset(&self) {
        if let Ok(mut counters) = self.counters.lock() {
            counters.clear();
        }
    }
}

/// Cadence key for one persona speaking in one thread.
pub fn cadence_key(channel: &str, thread_ts: &str, persona_id: &str) -> String {
    format!("{channel}|{thread_ts}|{persona_id}")
}

fn is_facial_emoji(ch: char) -> bool {
    matches!(u32::from(ch), 0x1F600..=0x1F64F | 0x263A | 0x2639)
}

fn is_emoji_char(ch: char) -> bool {
    matches!(
        u32::from(ch),
        0x1F300..=0x1F5FF
            | 0x1F600..=0x1F64F
            | 0x1F680..=0x1F6FF
            | 0x1F900..=0x1F9FF
            | 0x1FA70..=0x1FAFF
            | 0x2600..=0x26FF
            | 0x2700..=0x27BF
    )
}

fn is_emoji_modifier(ch: char) -> bool {
    // Variation selector and skin-tone modifiers ride along with the emoji
    // they follow.
    matches!(u32::from(ch), 0xFE0F | 0x1F3FB..=0x1F3FF)
}

/// Strips markdown headings, bullets, and bold markers, then collapses all
/// whitespace runs to single spaces.
fn strip_markdown(text: &str) -> String {
    let mut cleaned_lines = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        let without_heading = trimmed.trim_start_matches('#').trim_start();
        let without_bullet = if let Some(rest) = without_heading
            .strip_prefix("- ")
            .or_else(|| without_heading.strip_prefix("* "))
            .or_else(|| without_heading.strip_prefix("+ "))
        {
            rest
        } else {
            without_heading
        };
        cleaned_lines.push(without_bullet.replace("**", "").replace("__", ""));
    }
    cleaned_lines
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits into sentences, keeping terminal punctuation attached.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

fn normalize_sentence(sentence: &str) -> String {
    sentence
        .chars()
        .filter(|ch| ch.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Drops a canned opener sentence, but only when the whole sentence is the
/// opener plus filler; an opener leading into substantive content stays.
fn strip_canned_opener(sentences: &mut Vec<String>) {
    let Some(first) = sentences.first() else {
        return;
    };
    let matched = CANNED_OPENERS.iter().find(|opener| {
        first
            .to_lowercase()
            .starts_with(opener.to_lowercase().as_str())
    });
    let Some(opener) = matched else {
        return;
    };
    let remainder: String = first
        .chars()
        .skip(opener.chars().count())
        .filter(|ch| ch.is_alphanumeric() || ch.is_whitespace())
        .collect();
    // Up to two trailing words is filler ("Great question there!"), anything
    // longer is substantive and survives.
    if remainder.split_whitespace().count() <= 2 {
        sentences.remove(0);
    }
}

fn dedupe_adjacent_sentences(sentences: Vec<String>) -> Vec<String> {
    let mut deduped: Vec<String> = Vec::new();
    for sentence in sentences {
        if deduped
            .last()
            .is_some_and(|prev| normalize_sentence(prev) == normalize_sentence(&sentence))
        {
            continue;
        }
        deduped.push(sentence);
    }
    deduped
}

/// Applies the cadence policy: at most one emoji survives, facial preferred,
/// and only on the allowed beats.
fn apply_emoji_policy(text: &str, config: &HumanizeConfig, message_count: u64) -> String {
    let has_emoji = text.chars().any(is_emoji_char);
    if !has_emoji {
        return text.to_string();
    }

    let emoji_allowed = config.emoji_every > 0 && message_count % config.emoji_every == 0;
    let non_facial_allowed =
        emoji_allowed && config.non_facial_every > 0 && message_count % config.non_facial_every == 0;

    let keep: Option<char> = if !emoji_allowed {
        None
    } else if let Some(facial) = text.chars().find(|ch| is_facial_emoji(*ch)) {
        Some(facial)
    } else if non_facial_allowed {
        text.chars().find(|ch| is_emoji_char(*ch))
    } else {
        None
    };

    let mut kept_one = false;
    let mut result = String::with_capacity(text.len());
    let mut last_was_dropped_emoji = false;
    for ch in text.chars() {
        if is_emoji_char(ch) {
            if Some(ch) == keep && !kept_one {
                kept_one = true;
                last_was_dropped_emoji = false;
                result.push(ch);
            } else {
                last_was_dropped_emoji = true;
            }
            continue;
        }
        if is_emoji_modifier(ch) && last_was_dropped_emoji {
            continue;
        }
        last_was_dropped_emoji = false;
        result.push(ch);
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Full humanization pass. `key` scopes the emoji cadence to one persona in
/// one thread.
pub fn humanize(text: &str, config: &HumanizeConfig, cadence: &EmojiCadence, key: &str) -> String {
    if text.trim() == SKIP_SENTINEL {
        return SKIP_SENTINEL.to_string();
    }

    let flattened = strip_markdown(text);
    let mut sentences = split_sentences(&flattened);
    strip_canned_opener(&mut sentences);
    let mut sentences = dedupe_adjacent_sentences(sentences);
    sentences.truncate(config.max_sentences);
    let joined = sentences.join(" ");

    let message_count = cadence.next(key);
    let with_emoji_policy = apply_emoji_policy(&joined, config, message_count);
    truncate_with_ellipsis(&with_emoji_policy, config.max_chars)
}
