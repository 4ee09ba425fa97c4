use async_trait::async_trait;
use sa_domain::capability::LlmCapabilities;
use sa_domain::error::Result;
use sa_domain::stream::{BoxStream, StreamEvent};
use sa_domain::tool::{Message, ToolCall, ToolDefinition};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// A request to an LLM: the running message history plus the tools the
/// agent is currently allowed to call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub system: Option<String>,
}

/// A completed (non-streamed) reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: Message,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The agent-facing view of a model: the two ways a turn can be produced,
/// plus the capabilities the speaker-selection and tool-policy layers need
/// to reason about before calling either one.
///
/// Every call takes a `CancellationToken` supplied by the manager; an
/// implementation that makes a real network call must race it against the
/// request and return promptly once it's cancelled, so an interrupt can
/// unwind an in-flight selection or plugin call within one suspension point.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one turn to completion and return the full reply.
    async fn chat(&self, request: ChatRequest, cancellation_token: CancellationToken) -> Result<ChatResponse>;

    /// Run one turn, yielding incremental tokens and tool-call assembly
    /// events as they arrive.
    fn chat_stream(
        &self,
        request: ChatRequest,
        cancellation_token: CancellationToken,
    ) -> BoxStream<'static, StreamEvent>;

    fn capabilities(&self) -> &LlmCapabilities;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_core::Stream;
    use sa_domain::capability::ToolSupport;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubClient {
        capabilities: LlmCapabilities,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LlmClient for StubClient {
        async fn chat(&self, request: ChatRequest, _cancellation_token: CancellationToken) -> Result<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResponse {
                message: Message::assistant(format!("echo: {}", request.messages.len())),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".into()),
            })
        }

        fn chat_stream(
            &self,
            _request: ChatRequest,
            _cancellation_token: CancellationToken,
        ) -> BoxStream<'static, StreamEvent> {
            Box::pin(futures_util_stream_empty())
        }

        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }
    }

    fn futures_util_stream_empty() -> impl Stream<Item = StreamEvent> + Send {
        futures_util::stream::empty()
    }

    #[tokio::test]
    async fn chat_returns_assistant_message() {
        let client = StubClient {
            capabilities: LlmCapabilities {
                supports_tools: ToolSupport::Basic,
                ..Default::default()
            },
            calls: Arc::new(AtomicUsize::new(0)),
        };

        let response = client
            .chat(
                ChatRequest {
                    messages: vec![Message::user("hi")],
                    tools: Vec::new(),
                    system: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.message.content.text(), Some("echo: 1"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_token_is_observable_by_implementors() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[allow(dead_code)]
    fn assert_trait_object_safe(_: &dyn LlmClient) {}
    #[allow(dead_code)]
    fn assert_pin_box_is_client(c: Pin<Box<dyn LlmClient>>) -> Pin<Box<dyn LlmClient>> {
        c
    }
}
