//! Prompt assembly for persona contributions, consensus calls, and ad-hoc
//! replies.

use quorum_contract::{ChatMessage, Persona, Trigger, TriggerType};

/// Verdict markers the consensus classifier is instructed to emit.
pub const APPROVE_MARKER: &str = "APPROVE:";
pub const CHANGES_MARKER: &str = "CHANGES:";
pub const HUMAN_MARKER: &str = "HUMAN:";

/// Renders a history window newest-last, one `author: text` line each.
pub fn render_history(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return "(no prior messages)".to_string();
    }
    history
        .iter()
        .map(|message| format!("{}: {}", message.author_name, message.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Persona system prompt: identity, voice, and brevity rules.
pub fn build_persona_system_prompt(persona: &Persona) -> String {
    let soul = persona.soul.trim();
    let soul_section = if soul.is_empty() {
        String::new()
    } else {
        format!("\n\nPersonality:\n{soul}")
    };
    format!(
        "You are {name}, a {role} on an engineering team, chatting with teammates.\n\
         Write like a person in chat: short, first person, no markdown, no assistant mannerisms.\n\
         If you have nothing worth adding, reply with exactly SKIP.{soul_section}",
        name = persona.name,
        role = persona.role,
    )
}

/// Deterministic opening line for a new discussion thread.
pub fn opening_message(trigger: &Trigger) -> String {
    let subject = match trigger.trigger_type {
        TriggerType::PrReview => format!("Taking a look at {}", trigger.reference),
        TriggerType::BuildFailure => format!("Build broke on {}", trigger.reference),
        TriggerType::PrdKickoff => format!("Picking up {}", trigger.reference),
        TriggerType::Other => format!("Thread for {}", trigger.reference),
    };
    let context = trigger.context.trim();
    if context.is_empty() {
        format!("{subject}, thoughts welcome.")
    } else {
        format!("{subject}: {context}")
    }
}

/// Contribution prompt for one persona in one round.
pub fn build_contribution_prompt(
    trigger_context: &str,
    round: u32,
    history: &[ChatMessage],
) -> String {
    format!(
        "The team is discussing: {trigger_context}\n\
         This is round {round} of the discussion.\n\n\
         Thread so far:\n{history}\n\n\
         Add your take from your role's perspective, in one or two sentences. \
         Reply with exactly SKIP if everything you'd say is already covered.",
        history = render_history(history),
    )
}

/// Consensus classification prompt for the lead persona.
pub fn build_consensus_prompt(trigger_context: &str, round: u32, history: &[ChatMessage]) -> String {
    format!(
        "You are calling consensus on the team discussion about: {trigger_context}\n\
         Round {round} has finished.\n\n\
         Thread so far:\n{history}\n\n\
         Answer with exactly one line in one of these forms:\n\
         {APPROVE_MARKER} <short closing message>\n\
         {CHANGES_MARKER} <summary of the changes the team wants>\n\
         {HUMAN_MARKER} <why a human needs to decide>",
        history = render_history(history),
    )
}

/// First-person ad-hoc reply prompt used outside formal discussions.
pub fn build_reply_prompt(incoming_text: &str, context: &str, history: &[ChatMessage]) -> String {
    let context_section = if context.trim().is_empty() {
        String::new()
    } else {
        format!("Context: {}\n\n", context.trim())
    };
    format!(
        "{context_section}Thread so far:\n{history}\n\n\
         Someone just said: {incoming_text}\n\n\
         Reply naturally in one or two sentences, as yourself.",
        history = render_history(history),
    )
}
