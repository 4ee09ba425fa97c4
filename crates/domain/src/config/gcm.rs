use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Group-chat manager configuration (§4.1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Static configuration for one group-chat run. The selector's `func` and
/// `candidate_func` hooks (§4.1 steps 2–3) are supplied programmatically as
/// trait objects by the caller building the manager — they are not
/// config-file data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupChatConfig {
    /// Participant agent names, in registration order.
    pub participants: Vec<String>,

    /// Human-readable description per participant, used when rendering the
    /// selector prompt.
    #[serde(default)]
    pub participant_descriptions: HashMap<String, String>,

    /// Termination predicate(s) — the run stops once any one is satisfied.
    #[serde(default)]
    pub termination: TerminationConfig,

    /// Hard cap on completed turns, enforced in addition to `termination`.
    #[serde(default)]
    pub max_turns: Option<u32>,

    /// Selector prompt template rendered with `{roles, participants, history,
    /// state_of_run, handoff_context}` when no `selector_func` is supplied.
    #[serde(default = "d_selector_prompt")]
    pub selector_prompt: String,

    /// Whether the same agent may speak twice in a row.
    #[serde(default)]
    pub allow_repeated_speaker: bool,

    /// Retry budget for LLM-based selection (§4.1 step 4).
    #[serde(default = "d_max_selector_attempts")]
    pub max_selector_attempts: u32,
}

impl Default for GroupChatConfig {
    /// The team shipped ambiently via `config.toml`'s `[gcm]` table — this
    /// stack does not load agent/team YAML definitions dynamically (§6.5),
    /// so every session is built from this one static roster unless the
    /// caller overrides it. An empty participant list fails
    /// `GroupChatConfig::validate` at run start, not at config load time.
    fn default() -> Self {
        Self {
            participants: Vec::new(),
            participant_descriptions: HashMap::new(),
            termination: TerminationConfig::default(),
            max_turns: None,
            selector_prompt: d_selector_prompt(),
            allow_repeated_speaker: false,
            max_selector_attempts: d_max_selector_attempts(),
        }
    }
}

impl GroupChatConfig {
    /// Configuration-level checks (§7 "Configuration" error kind). Distinct
    /// from `ConfigError`/severity-ranked validation elsewhere — a
    /// group-chat run simply cannot start if any of these fail.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.participants.is_empty() {
            return Err(crate::error::Error::Config(
                "participants must not be empty".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for p in &self.participants {
            if p.is_empty() {
                return Err(crate::error::Error::Config(
                    "participant name must not be empty".into(),
                ));
            }
            if !seen.insert(p.as_str()) {
                return Err(crate::error::Error::Config(format!(
                    "duplicate participant name \"{p}\""
                )));
            }
        }
        if self.termination.conditions.is_empty() && self.max_turns.is_none() {
            return Err(crate::error::Error::Config(
                "at least one termination condition or max_turns must be set".into(),
            ));
        }
        if self.max_selector_attempts == 0 {
            return Err(crate::error::Error::Config(
                "max_selector_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TerminationConfig {
    #[serde(default)]
    pub conditions: Vec<TerminationCondition>,
}

/// A single termination predicate, evaluated against the most recent event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationCondition {
    /// Triggers whenever a `StopMessage` event is appended.
    StopMessage,
    /// Triggers when a `ChatMessage`'s content contains `text`.
    TextMention { text: String },
    /// Triggers once `count` `ChatMessage` events have been appended.
    MaxMessages { count: u32 },
}

fn d_selector_prompt() -> String {
    "You are coordinating a conversation between: {participants}.\n\
     Roles:\n{roles}\n\nConversation so far:\n{history}\n\n\
     State of the run: {state_of_run}\nHandoff context: {handoff_context}\n\n\
     Select exactly one participant name to speak next."
        .to_string()
}

fn d_max_selector_attempts() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> GroupChatConfig {
        GroupChatConfig {
            participants: vec!["A".into(), "B".into()],
            participant_descriptions: HashMap::new(),
            termination: TerminationConfig {
                conditions: vec![TerminationCondition::StopMessage],
            },
            max_turns: None,
            selector_prompt: d_selector_prompt(),
            allow_repeated_speaker: false,
            max_selector_attempts: 3,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn empty_participants_rejected() {
        let mut cfg = base();
        cfg.participants.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn duplicate_participants_rejected() {
        let mut cfg = base();
        cfg.participants.push("A".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn no_termination_and_no_max_turns_rejected() {
        let mut cfg = base();
        cfg.termination.conditions.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn max_turns_alone_is_sufficient() {
        let mut cfg = base();
        cfg.termination.conditions.clear();
        cfg.max_turns = Some(5);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_selector_attempts_rejected() {
        let mut cfg = base();
        cfg.max_selector_attempts = 0;
        assert!(cfg.validate().is_err());
    }
}
