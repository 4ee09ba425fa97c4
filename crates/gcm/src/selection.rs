use std::collections::HashMap;

use sa_agents::{ChatRequest, LlmClient};
use sa_domain::error::{Error, Result};
use sa_domain::message::Event;
use sa_domain::tool::Message;
use sa_domain::trace::{SelectionSource, TraceEvent};
use tokio_util::sync::CancellationToken;

type SelectorFn = Box<dyn Fn(&SelectionInput<'_>) -> Option<String> + Send + Sync>;
type CandidateFn = Box<dyn Fn(&SelectionInput<'_>) -> Vec<String> + Send + Sync>;

/// Everything the selection chain needs to pick the next speaker.
pub struct SelectionInput<'a> {
    pub session_id: &'a str,
    pub thread: &'a [Event],
    pub participants: &'a [String],
    pub participant_descriptions: &'a HashMap<String, String>,
    pub previous_speaker: Option<&'a str>,
    pub allow_repeated_speaker: bool,
    /// Resolved by the manager consulting every plugin's
    /// `on_before_speaker_selection`; `Some` short-circuits the rest of
    /// the chain.
    pub plugin_override: Option<String>,
    /// Plugin-provided template variables (`state_of_run`,
    /// `handoff_context`, ...) merged into the selector prompt.
    pub extra_context: HashMap<String, String>,
}

/// The speaker-selection state machine (§4.1 "Speaker selection").
pub struct SpeakerSelector {
    selector_prompt: String,
    max_attempts: u32,
    selector_func: Option<SelectorFn>,
    candidate_func: Option<CandidateFn>,
}

impl SpeakerSelector {
    pub fn new(selector_prompt: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            selector_prompt: selector_prompt.into(),
            max_attempts: max_attempts.max(1),
            selector_func: None,
            candidate_func: None,
        }
    }

    pub fn with_selector_func(mut self, f: SelectorFn) -> Self {
        self.selector_func = Some(f);
        self
    }

    pub fn with_candidate_func(mut self, f: CandidateFn) -> Self {
        self.candidate_func = Some(f);
        self
    }

    /// Run the full precedence chain and return the chosen speaker.
    ///
    /// Every LLM call made here races `cancellation_token` — an interrupt
    /// during selection unwinds at the next suspension point rather than
    /// waiting for the model to finish.
    pub async fn select(
        &self,
        llm: &dyn LlmClient,
        input: &SelectionInput<'_>,
        cancellation_token: &CancellationToken,
    ) -> Result<(String, SelectionSource)> {
        if let Some(name) = &input.plugin_override {
            return Ok((name.clone(), SelectionSource::PluginOverride));
        }

        if let Some(f) = &self.selector_func {
            if let Some(name) = f(input) {
                return Ok((name, SelectionSource::SelectorFunc));
            }
        }

        let candidates = self.candidates(input)?;

        // If the candidate function (or the default previous-speaker
        // exclusion) narrowed the field to exactly one name, there is
        // nothing for the LLM to decide.
        if self.candidate_func.is_some() && candidates.len() == 1 {
            return Ok((candidates[0].clone(), SelectionSource::CandidateFunc));
        }

        for attempt in 1..=self.max_attempts {
            if cancellation_token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            TraceEvent::SelectorAttempt {
                session_id: input.session_id.to_string(),
                attempt,
                max_attempts: self.max_attempts,
                reason: "awaiting llm selection".into(),
            }
            .emit();

            let prompt = self.render_prompt(input, &candidates);
            let response = tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => return Err(Error::Cancelled),
                result = llm.chat(
                    ChatRequest {
                        messages: vec![Message::system(&prompt)],
                        tools: Vec::new(),
                        system: None,
                    },
                    cancellation_token.clone(),
                ) => result?,
            };

            let text = response.message.content.extract_all_text();
            let mentions: Vec<&String> = candidates
                .iter()
                .filter(|candidate| text.contains(candidate.as_str()))
                .collect();

            if mentions.len() == 1 {
                return Ok((mentions[0].clone(), SelectionSource::Llm));
            }
        }

        self.fallback(input, &candidates)
    }

    fn candidates(&self, input: &SelectionInput<'_>) -> Result<Vec<String>> {
        if let Some(f) = &self.candidate_func {
            let candidates = f(input);
            if candidates.is_empty() {
                return Err(Error::Validation(
                    "candidate function returned no eligible speakers".into(),
                ));
            }
            return Ok(candidates);
        }

        Ok(input
            .participants
            .iter()
            .filter(|p| input.allow_repeated_speaker || Some(p.as_str()) != input.previous_speaker)
            .cloned()
            .collect())
    }

    fn fallback(
        &self,
        input: &SelectionInput<'_>,
        candidates: &[String],
    ) -> Result<(String, SelectionSource)> {
        let (name, source) = match input.previous_speaker {
            Some(prev) => (prev.to_string(), SelectionSource::FallbackPrevious),
            None => match input.participants.first() {
                Some(first) => (first.clone(), SelectionSource::FallbackFirst),
                None => {
                    return Err(Error::Validation(
                        "no participants available for fallback selection".into(),
                    ))
                }
            },
        };

        TraceEvent::SelectorFallback {
            session_id: input.session_id.to_string(),
            attempts: self.max_attempts,
            fallback_speaker: name.clone(),
        }
        .emit();

        tracing::warn!(
            session_id = %input.session_id,
            attempts = self.max_attempts,
            candidates = ?candidates,
            fallback = %name,
            "speaker selection exhausted retries, falling back"
        );

        Ok((name, source))
    }

    fn render_prompt(&self, input: &SelectionInput<'_>, candidates: &[String]) -> String {
        let roles: String = candidates
            .iter()
            .map(|name| {
                let desc = input
                    .participant_descriptions
                    .get(name)
                    .map(String::as_str)
                    .unwrap_or("");
                format!("- {name}: {desc}")
            })
            .collect::<Vec<_>>()
            .join("\n");

        let history: String = input
            .thread
            .iter()
            .rev()
            .take(10)
            .rev()
            .filter_map(|e| match e {
                Event::ChatMessage { source, content, .. } => Some(format!("{source}: {content}")),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = self
            .selector_prompt
            .replace("{roles}", &roles)
            .replace("{participants}", &candidates.join(", "))
            .replace("{history}", &history);

        for (key, value) in &input.extra_context {
            prompt = prompt.replace(&format!("{{{key}}}"), value);
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sa_agents::ChatResponse;
    use sa_domain::capability::LlmCapabilities;
    use sa_domain::stream::{BoxStream, StreamEvent};

    struct ScriptedClient {
        replies: std::sync::Mutex<Vec<&'static str>>,
        capabilities: LlmCapabilities,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn chat(&self, _request: ChatRequest, _cancellation_token: CancellationToken) -> Result<ChatResponse> {
            let reply = self.replies.lock().unwrap().remove(0);
            Ok(ChatResponse {
                message: Message::assistant(reply),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".into()),
            })
        }
        fn chat_stream(
            &self,
            _request: ChatRequest,
            _cancellation_token: CancellationToken,
        ) -> BoxStream<'static, StreamEvent> {
            Box::pin(futures_util::stream::empty())
        }
        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }
    }

    fn input<'a>(participants: &'a [String], previous: Option<&'a str>) -> SelectionInput<'a> {
        SelectionInput {
            session_id: "s1",
            thread: &[],
            participants,
            participant_descriptions: &HashMap::new(),
            previous_speaker: previous,
            allow_repeated_speaker: false,
            plugin_override: None,
            extra_context: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn plugin_override_short_circuits() {
        let selector = SpeakerSelector::new("pick one of {participants}", 1);
        let participants = vec!["a".to_string(), "b".to_string()];
        let mut i = input(&participants, None);
        i.plugin_override = Some("b".into());
        let client = ScriptedClient {
            replies: std::sync::Mutex::new(vec![]),
            capabilities: LlmCapabilities::default(),
        };
        let (name, source) = selector.select(&client, &i, &CancellationToken::new()).await.unwrap();
        assert_eq!(name, "b");
        assert_eq!(source, SelectionSource::PluginOverride);
    }

    #[tokio::test]
    async fn single_unambiguous_mention_wins() {
        let selector = SpeakerSelector::new("pick one of {participants}", 2);
        let participants = vec!["agent_a".to_string(), "agent_b".to_string()];
        let i = input(&participants, None);
        let client = ScriptedClient {
            replies: std::sync::Mutex::new(vec!["I choose agent_b to go next"]),
            capabilities: LlmCapabilities::default(),
        };
        let (name, source) = selector.select(&client, &i, &CancellationToken::new()).await.unwrap();
        assert_eq!(name, "agent_b");
        assert_eq!(source, SelectionSource::Llm);
    }

    #[tokio::test]
    async fn retries_then_falls_back_to_previous_speaker() {
        let selector = SpeakerSelector::new("pick one of {participants}", 2);
        let participants = vec!["agent_a".to_string(), "agent_b".to_string()];
        let i = input(&participants, Some("agent_a"));
        let client = ScriptedClient {
            // Neither reply mentions exactly one candidate: first mentions
            // both, second mentions neither.
            replies: std::sync::Mutex::new(vec!["agent_a or agent_b", "no idea"]),
            capabilities: LlmCapabilities::default(),
        };
        let (name, source) = selector.select(&client, &i, &CancellationToken::new()).await.unwrap();
        assert_eq!(name, "agent_a");
        assert_eq!(source, SelectionSource::FallbackPrevious);
    }

    #[tokio::test]
    async fn falls_back_to_first_participant_when_no_previous_speaker() {
        let selector = SpeakerSelector::new("pick one of {participants}", 1);
        let participants = vec!["agent_a".to_string(), "agent_b".to_string()];
        let i = input(&participants, None);
        let client = ScriptedClient {
            replies: std::sync::Mutex::new(vec!["no idea"]),
            capabilities: LlmCapabilities::default(),
        };
        let (name, source) = selector.select(&client, &i, &CancellationToken::new()).await.unwrap();
        assert_eq!(name, "agent_a");
        assert_eq!(source, SelectionSource::FallbackFirst);
    }

    #[tokio::test]
    async fn excludes_previous_speaker_unless_repeats_allowed() {
        let selector = SpeakerSelector::new("pick one of {participants}", 1);
        let participants = vec!["agent_a".to_string(), "agent_b".to_string()];
        let mut i = input(&participants, Some("agent_a"));
        i.allow_repeated_speaker = false;
        let client = ScriptedClient {
            replies: std::sync::Mutex::new(vec!["agent_b should continue"]),
            capabilities: LlmCapabilities::default(),
        };
        let (name, _) = selector.select(&client, &i, &CancellationToken::new()).await.unwrap();
        assert_eq!(name, "agent_b");
    }

    #[tokio::test]
    async fn cancelled_token_aborts_selection_before_any_llm_call() {
        let selector = SpeakerSelector::new("pick one of {participants}", 3);
        let participants = vec!["agent_a".to_string(), "agent_b".to_string()];
        let i = input(&participants, None);
        let client = ScriptedClient {
            replies: std::sync::Mutex::new(vec!["agent_a or agent_b"; 3]),
            capabilities: LlmCapabilities::default(),
        };
        let token = CancellationToken::new();
        token.cancel();
        let err = selector.select(&client, &i, &token).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
