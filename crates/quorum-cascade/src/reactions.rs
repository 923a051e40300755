//! Role-flavored reaction emoji candidates.

use quorum_contract::Persona;

const SECURITY_REACTIONS: &[&str] = &["lock", "shield", "eyes", "rotating_light"];
const QUALITY_REACTIONS: &[&str] = &["white_check_mark", "mag", "test_tube", "memo"];
const LEAD_REACTIONS: &[&str] = &["brain", "bulb", "chart_with_upwards_trend", "speech_balloon"];
const DEVELOPER_REACTIONS: &[&str] = &["rocket", "hammer_and_wrench", "computer", "fire"];
const DEFAULT_REACTIONS: &[&str] = &["thumbsup", "eyes", "raised_hands"];

/// Ordered keyword scan over the lowercased role; first keyword wins, so a
/// "Quality Assurance Lead" reacts like QA, not like a lead.
const REACTION_RULES: &[(&str, &[&str])] = &[
    ("security", SECURITY_REACTIONS),
    ("qa", QUALITY_REACTIONS),
    ("quality", QUALITY_REACTIONS),
    ("test", QUALITY_REACTIONS),
    ("lead", LEAD_REACTIONS),
    ("architect", LEAD_REACTIONS),
    ("developer", DEVELOPER_REACTIONS),
    ("implement", DEVELOPER_REACTIONS),
    ("engineer", DEVELOPER_REACTIONS),
    ("dev", DEVELOPER_REACTIONS),
];

pub fn reaction_candidates_for_persona(persona: &Persona) -> &'static [&'static str] {
    let role = persona.role.to_lowercase();
    REACTION_RULES
        .iter()
        .find(|(keyword, _)| role.contains(keyword))
        .map(|(_, reactions)| *reactions)
        .unwrap_or(DEFAULT_REACTIONS)
}
