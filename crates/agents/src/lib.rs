//! `sa-agents` — the agent container: one participant's identity, model
//! client, and tool workbench, plus the input queue that pauses a turn
//! while it waits on a human answer.

pub mod container;
pub mod input_queue;
pub mod llm;
pub mod workbench;

pub use container::AgentContainer;
pub use input_queue::{AgentInputQueue, InputResponse, PendingInputInfo};
pub use llm::{ChatRequest, ChatResponse, LlmClient};
pub use workbench::{ToolExecutionResult, ToolPolicy, Workbench};
