use std::sync::Arc;

use futures_util::future::join_all;
use sa_domain::error::{Error, Result};
use sa_domain::message::{ComponentScore, Event, ToolCall as EventToolCall, ToolCallResult};
use sa_domain::tool::{Message, ToolCall as ProviderToolCall};
use tokio_util::sync::CancellationToken;

use crate::llm::{ChatRequest, LlmClient};
use crate::workbench::{ToolExecutionResult, Workbench};

/// Maximum tool-call round trips within a single turn before the container
/// gives up and surfaces the last assistant text as final.
const MAX_TOOL_LOOPS: usize = 25;

/// One participant in the group chat: an identity, a model, and the tools
/// it is allowed to call. `take_turn` drives the full request/tool-dispatch
/// loop and returns the sequence of domain events produced, ready to be
/// appended to the conversation tree by the caller.
pub struct AgentContainer {
    pub name: String,
    pub description: String,
    pub system_prompt: Option<String>,
    llm: Arc<dyn LlmClient>,
    workbench: Option<Arc<dyn Workbench>>,
}

impl AgentContainer {
    pub fn new(name: impl Into<String>, description: impl Into<String>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_prompt: None,
            llm,
            workbench: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_workbench(mut self, workbench: Arc<dyn Workbench>) -> Self {
        self.workbench = Some(workbench);
        self
    }

    /// Run one full turn for this agent against the given history,
    /// returning every event produced (the final chat message, and any
    /// `tool_call_request`/`tool_call_execution` pairs along the way).
    ///
    /// Each model call races `cancellation_token`: an interrupt unwinds the
    /// turn at the next suspension point instead of waiting for the tool
    /// loop to finish on its own.
    pub async fn take_turn(
        &self,
        history: &[Message],
        cancellation_token: CancellationToken,
    ) -> Result<Vec<Event>> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = &self.system_prompt {
            messages.push(Message::system(system));
        }
        messages.extend_from_slice(history);

        let tools = self
            .workbench
            .as_ref()
            .map(|w| w.list_tools())
            .unwrap_or_default();

        let mut events = Vec::new();

        for loop_idx in 0..MAX_TOOL_LOOPS {
            if cancellation_token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let response = tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => return Err(Error::Cancelled),
                result = self.llm.chat(
                    ChatRequest {
                        messages: messages.clone(),
                        tools: tools.clone(),
                        system: None,
                    },
                    cancellation_token.clone(),
                ) => result?,
            };

            if response.tool_calls.is_empty() {
                events.push(Event::ChatMessage {
                    source: self.name.clone(),
                    content: response.message.content.extract_all_text(),
                    id: uuid::Uuid::new_v4().to_string(),
                });
                return Ok(events);
            }

            events.push(Event::ToolCallRequest {
                source: self.name.clone(),
                calls: response
                    .tool_calls
                    .iter()
                    .map(|c| EventToolCall {
                        id: c.call_id.clone(),
                        name: c.tool_name.clone(),
                        args: c.arguments.clone(),
                    })
                    .collect(),
            });
            messages.push(response.message.clone());

            let results = self.dispatch_tools(&response.tool_calls).await;
            for (call, result) in response.tool_calls.iter().zip(&results) {
                messages.push(Message::tool_result(&call.call_id, &result.content));
            }

            events.push(Event::ToolCallExecution {
                source: self.name.clone(),
                results: response
                    .tool_calls
                    .iter()
                    .zip(results)
                    .map(|(call, result)| ToolCallResult {
                        call_id: call.call_id.clone(),
                        name: call.tool_name.clone(),
                        ok: result.ok,
                        content: result.content,
                    })
                    .collect(),
            });

            if loop_idx == MAX_TOOL_LOOPS - 1 {
                tracing::warn!(agent = %self.name, "tool loop limit reached");
            }
        }

        Ok(events)
    }

    async fn dispatch_tools(&self, calls: &[ProviderToolCall]) -> Vec<ToolExecutionResult> {
        let Some(workbench) = &self.workbench else {
            return calls
                .iter()
                .map(|c| ToolExecutionResult {
                    call_id: c.call_id.clone(),
                    ok: false,
                    content: "no workbench configured for this agent".into(),
                })
                .collect();
        };

        let futures = calls.iter().map(|call| async move {
            match workbench.execute(call).await {
                Ok(result) => result,
                Err(e) => ToolExecutionResult {
                    call_id: call.call_id.clone(),
                    ok: false,
                    content: e.to_string(),
                },
            }
        });
        join_all(futures).await
    }
}

/// Extracted list of `ComponentScore`s an agent's structured reply carried,
/// if any — used by the analysis watchlist plugin to avoid re-parsing raw
/// text.
pub fn parse_component_scores(raw: &serde_json::Value) -> Vec<ComponentScore> {
    raw.get("scores")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sa_domain::capability::LlmCapabilities;
    use sa_domain::stream::{BoxStream, StreamEvent};
    use sa_domain::tool::ToolDefinition;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OneShotClient {
        capabilities: LlmCapabilities,
    }

    #[async_trait]
    impl LlmClient for OneShotClient {
        async fn chat(
            &self,
            _request: ChatRequest,
            _cancellation_token: CancellationToken,
        ) -> Result<crate::llm::ChatResponse> {
            Ok(crate::llm::ChatResponse {
                message: Message::assistant("final answer"),
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

    struct OneToolThenDoneClient {
        calls: AtomicUsize,
        capabilities: LlmCapabilities,
    }

    #[async_trait]
    impl LlmClient for OneToolThenDoneClient {
        async fn chat(
            &self,
            _request: ChatRequest,
            _cancellation_token: CancellationToken,
        ) -> Result<crate::llm::ChatResponse> {
            let call_idx = self.calls.fetch_add(1, Ordering::SeqCst);
            if call_idx == 0 {
                Ok(crate::llm::ChatResponse {
                    message: Message::assistant(""),
                    tool_calls: vec![ProviderToolCall {
                        call_id: "c1".into(),
                        tool_name: "echo".into(),
                        arguments: serde_json::json!({"text": "hi"}),
                    }],
                    finish_reason: None,
                })
            } else {
                Ok(crate::llm::ChatResponse {
                    message: Message::assistant("done after tool"),
                    tool_calls: Vec::new(),
                    finish_reason: Some("stop".into()),
                })
            }
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

    struct EchoWorkbench;

    #[async_trait]
    impl Workbench for EchoWorkbench {
        fn list_tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "echo".into(),
                description: "echoes input".into(),
                parameters: serde_json::json!({}),
            }]
        }
        async fn execute(&self, call: &ProviderToolCall) -> Result<ToolExecutionResult> {
            Ok(ToolExecutionResult {
                call_id: call.call_id.clone(),
                ok: true,
                content: call.arguments.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn no_tool_calls_yields_single_chat_message() {
        let container = AgentContainer::new(
            "agent_a",
            "desc",
            Arc::new(OneShotClient {
                capabilities: LlmCapabilities::default(),
            }),
        );
        let events = container
            .take_turn(&[Message::user("hi")], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::ChatMessage { content, .. } if content == "final answer"));
    }

    #[tokio::test]
    async fn tool_call_then_final_yields_three_events() {
        let container = AgentContainer::new(
            "agent_a",
            "desc",
            Arc::new(OneToolThenDoneClient {
                calls: AtomicUsize::new(0),
                capabilities: LlmCapabilities::default(),
            }),
        )
        .with_workbench(Arc::new(EchoWorkbench));

        let events = container
            .take_turn(&[Message::user("hi")], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Event::ToolCallRequest { .. }));
        assert!(matches!(events[1], Event::ToolCallExecution { .. }));
        assert!(matches!(&events[2], Event::ChatMessage { content, .. } if content == "done after tool"));
    }

    #[tokio::test]
    async fn missing_workbench_fails_tool_calls_gracefully() {
        let container = AgentContainer::new(
            "agent_a",
            "desc",
            Arc::new(OneToolThenDoneClient {
                calls: AtomicUsize::new(0),
                capabilities: LlmCapabilities::default(),
            }),
        );
        let events = container
            .take_turn(&[Message::user("hi")], CancellationToken::new())
            .await
            .unwrap();
        let Event::ToolCallExecution { results, .. } = &events[1] else {
            panic!("expected tool_call_execution");
        };
        assert!(!results[0].ok);
    }
}
