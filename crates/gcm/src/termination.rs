use sa_domain::config::TerminationCondition;
use sa_domain::message::Event;

/// Checks a single event (the most recently appended thread entry) against
/// the run's termination conditions plus the `max_turns` cap.
pub struct TerminationChecker {
    conditions: Vec<TerminationCondition>,
    max_turns: Option<u32>,
    message_count: u32,
}

/// Why the run ended, for the `run_termination{status, reason}` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    StopMessage,
    TextMention(String),
    MaxMessages(u32),
    MaxTurns(u32),
}

impl TerminationChecker {
    pub fn new(conditions: Vec<TerminationCondition>, max_turns: Option<u32>) -> Self {
        Self {
            conditions,
            max_turns,
            message_count: 0,
        }
    }

    pub fn reset(&mut self) {
        self.message_count = 0;
    }

    /// Record a completed turn (one `ChatMessage` from a participant) and
    /// check every condition in order. Returns the first reason matched.
    pub fn check(&mut self, event: &Event) -> Option<TerminationReason> {
        if matches!(event, Event::ChatMessage { .. }) {
            self.message_count += 1;
        }

        for condition in &self.conditions {
            match condition {
                TerminationCondition::StopMessage => {
                    if matches!(event, Event::StopMessage { .. }) {
                        return Some(TerminationReason::StopMessage);
                    }
                }
                TerminationCondition::TextMention { text } => {
                    if let Event::ChatMessage { content, .. } = event {
                        if content.contains(text.as_str()) {
                            return Some(TerminationReason::TextMention(text.clone()));
                        }
                    }
                }
                TerminationCondition::MaxMessages { count } => {
                    if self.message_count >= *count {
                        return Some(TerminationReason::MaxMessages(*count));
                    }
                }
            }
        }

        if let Some(max_turns) = self.max_turns {
            if self.message_count >= max_turns {
                return Some(TerminationReason::MaxTurns(max_turns));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(content: &str) -> Event {
        Event::ChatMessage {
            source: "agent_a".into(),
            content: content.into(),
            id: "m1".into(),
        }
    }

    #[test]
    fn stop_message_terminates() {
        let mut checker = TerminationChecker::new(vec![TerminationCondition::StopMessage], None);
        let stop = Event::StopMessage {
            source: "agent_a".into(),
            content: "USER_INTERRUPT".into(),
        };
        assert_eq!(checker.check(&stop), Some(TerminationReason::StopMessage));
    }

    #[test]
    fn text_mention_terminates() {
        let mut checker = TerminationChecker::new(
            vec![TerminationCondition::TextMention { text: "DONE".into() }],
            None,
        );
        assert!(checker.check(&chat("still working")).is_none());
        assert_eq!(
            checker.check(&chat("all DONE here")),
            Some(TerminationReason::TextMention("DONE".into()))
        );
    }

    #[test]
    fn max_turns_enforced_without_explicit_condition() {
        let mut checker = TerminationChecker::new(vec![], Some(2));
        assert!(checker.check(&chat("one")).is_none());
        assert_eq!(checker.check(&chat("two")), Some(TerminationReason::MaxTurns(2)));
    }

    #[test]
    fn max_messages_condition_counts_only_chat_messages() {
        let mut checker =
            TerminationChecker::new(vec![TerminationCondition::MaxMessages { count: 1 }], None);
        let tool_event = Event::ToolCallRequest {
            source: "agent_a".into(),
            calls: vec![],
        };
        assert!(checker.check(&tool_event).is_none());
        assert_eq!(
            checker.check(&chat("first")),
            Some(TerminationReason::MaxMessages(1))
        );
    }
}
