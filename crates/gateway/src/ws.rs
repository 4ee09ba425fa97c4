//! The observer WebSocket handler (§4.7 "Gateway"): one task per connected
//! dashboard/tab, translating between `sa_protocol` wire frames and the
//! `sa_gcm`/`sa_sessions` domain types.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use sa_domain::error::Error;
use sa_domain::message::Event;
use sa_gcm::RunOutcome;
use sa_protocol::{ClientFrame, RunStatus, ServerFrame, ToolCallSummary, ToolExecutionSummary, WatchlistComponentView};
use serde::Deserialize;

use crate::auth;
use crate::state::AppState;

const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct ObserverQuery {
    #[serde(default)]
    token: Option<String>,
}

pub async fn observer_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ObserverQuery>,
) -> Response {
    if !auth::check(state.api_token_hash.as_ref(), query.token.as_deref()) {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({ "error": "invalid or missing API token" })),
        )
            .into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state)).into_response()
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let hello = match wait_for_hello(&mut stream).await {
        Some(frame) => frame,
        None => return,
    };

    let ClientFrame::StartRun {
        session_id,
        initial_topic,
        ..
    } = hello
    else {
        unreachable!("wait_for_hello only returns StartRun");
    };

    let session = match state.sessions.get_or_create(&session_id, &state.config.gcm).await {
        Ok(session) => session,
        Err(e) => {
            let _ = send_frame(
                &mut sink,
                ServerFrame::Error {
                    timestamp: Utc::now(),
                    error_code: e.error_code().into(),
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    let (observer_id, mut output_rx) = session.attach_observer();

    send_bootstrap(&mut sink, &state, &session_id).await;

    // First observer on a still-empty tree kicks off the run.
    let should_start = {
        let mgr = session.manager.lock().await;
        mgr.tree().is_empty()
    };
    if should_start {
        if let Some(topic) = &initial_topic {
            let mut mgr = session.manager.lock().await;
            match mgr.start(topic).await {
                Ok(outcome) => broadcast_outcome(&session, outcome),
                Err(e) => session.broadcast(error_frame(&e)),
            }
        }
    } else {
        let mgr = session.manager.lock().await;
        session.broadcast(tree_update_frame(&mgr));
    }

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = output_rx.recv().await {
            if send_frame(&mut sink, frame).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&session, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, session_id = %session_id, "observer socket error");
                        break;
                    }
                }
            }
        }
    }

    writer.abort();
    session.detach_observer(observer_id);
    if session.observer_count() == 0 {
        session.input_queue.cancel_session(&session_id, "observer disconnected");
    }
}

async fn wait_for_hello(
    stream: &mut futures_util::stream::SplitStream<WebSocket>,
) -> Option<ClientFrame> {
    let deadline = tokio::time::sleep(HELLO_TIMEOUT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return None,
            msg = stream.next() => {
                match msg? {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(frame @ ClientFrame::StartRun { .. }) => return Some(frame),
                            Ok(ClientFrame::RunStartConfirmed { session_id, .. }) => {
                                return Some(ClientFrame::StartRun {
                                    session_id,
                                    initial_topic: None,
                                    company_name: None,
                                    bill_name: None,
                                    congress: None,
                                    analysis_prompt: None,
                                    trigger_threshold: None,
                                });
                            }
                            _ => continue,
                        }
                    }
                    Ok(Message::Close(_)) => return None,
                    Ok(_) => continue,
                    Err(_) => return None,
                }
            }
        }
    }
}

async fn send_bootstrap(sink: &mut futures_util::stream::SplitSink<WebSocket, Message>, state: &AppState, _session_id: &str) {
    let names = state.config.gcm.participants.clone();
    let details: HashMap<String, String> = state.config.gcm.participant_descriptions.clone();

    let _ = send_frame(
        sink,
        ServerFrame::AgentTeamNames {
            timestamp: Utc::now(),
            names: names.clone(),
        },
    )
    .await;
    let _ = send_frame(
        sink,
        ServerFrame::AgentDetails {
            timestamp: Utc::now(),
            details,
        },
    )
    .await;
    let _ = send_frame(
        sink,
        ServerFrame::ParticipantNames {
            timestamp: Utc::now(),
            participants: names,
        },
    )
    .await;
}

async fn send_frame(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: ServerFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(&frame).unwrap_or_default();
    sink.send(Message::Text(text)).await
}

fn error_frame(e: &Error) -> ServerFrame {
    ServerFrame::Error {
        timestamp: Utc::now(),
        error_code: e.error_code().into(),
        message: e.to_string(),
    }
}

fn tree_update_frame(mgr: &sa_gcm::GroupChatManager) -> ServerFrame {
    ServerFrame::TreeUpdate {
        timestamp: Utc::now(),
        root: mgr.tree().reachable_from_root().into_iter().cloned().collect(),
        current_branch_id: mgr.tree().current_branch_id().to_string(),
    }
}

/// Demultiplex an inbound client frame (§4.7 step 5) and apply it to the
/// session's manager, broadcasting whatever it produces to every observer.
async fn handle_inbound(session: &sa_sessions::Session, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            session.broadcast(ServerFrame::Error {
                timestamp: Utc::now(),
                error_code: "validation_error".into(),
                message: format!("malformed frame: {e}"),
            });
            return;
        }
    };

    match frame {
        ClientFrame::UserInterrupt {} => {
            let mut mgr = session.manager.lock().await;
            mgr.interrupt();
            session.broadcast(ServerFrame::InterruptAcknowledged { timestamp: Utc::now() });
        }
        ClientFrame::UserDirectedMessage {
            content,
            target_agent,
            trim_count,
        } => {
            let mut mgr = session.manager.lock().await;
            match mgr.send_user_directed(&target_agent, &content, trim_count).await {
                Ok(outcome) => {
                    drop(mgr);
                    broadcast_outcome(session, outcome);
                }
                Err(e) => session.broadcast(error_frame(&e)),
            }
        }
        ClientFrame::HumanInputResponse { request_id, user_input } => {
            session.input_queue.provide(&request_id, user_input);
        }
        ClientFrame::TerminateRequest {} => {
            let mut mgr = session.manager.lock().await;
            let stop = mgr.interrupt();
            drop(mgr);
            session.broadcast(ServerFrame::RunTermination {
                timestamp: Utc::now(),
                status: RunStatus::Interrupted,
                reason: stop_reason(&stop),
                source: "observer".into(),
            });
        }
        ClientFrame::StartRun { .. } | ClientFrame::RunStartConfirmed { .. } => {
            // Already consumed as the connection's hello frame; a second
            // one is a client bug we simply ignore rather than restart.
        }
        ClientFrame::ComponentGenerationRequest { analysis_prompt } => {
            let mgr = session.manager.lock().await;
            let Some(plugin) = mgr.analysis_plugin() else {
                session.broadcast(ServerFrame::Error {
                    timestamp: Utc::now(),
                    error_code: "validation_error".into(),
                    message: "no analysis-watchlist plugin is configured for this session".into(),
                });
                return;
            };
            let cancellation_token = mgr.cancellation_token();
            match plugin.generate_components(&analysis_prompt, cancellation_token).await {
                Ok(components) => {
                    drop(mgr);
                    session.broadcast(ServerFrame::AnalysisComponentsInit {
                        timestamp: Utc::now(),
                        components: components
                            .into_iter()
                            .map(|c| WatchlistComponentView {
                                label: c.label,
                                description: c.description,
                                color: c.color.unwrap_or_default(),
                            })
                            .collect(),
                    });
                }
                Err(e) => {
                    drop(mgr);
                    session.broadcast(error_frame(&e));
                }
            }
        }
    }
}

fn stop_reason(event: &Event) -> String {
    match event {
        Event::StopMessage { content, .. } => content.clone(),
        _ => String::new(),
    }
}

/// Translate a `RunOutcome` into wire frames and broadcast them, in order,
/// to every observer of `session` (§4.7 step 6).
fn broadcast_outcome(session: &sa_sessions::Session, outcome: RunOutcome) {
    for (event, node_id) in outcome.events.into_iter().zip(outcome.node_ids) {
        if let Some(frame) = translate_event(event, node_id) {
            session.broadcast(frame);
        }
    }

    if let Some(reason) = outcome.termination {
        session.broadcast(ServerFrame::RunTermination {
            timestamp: Utc::now(),
            status: RunStatus::Completed,
            reason: format!("{reason:?}"),
            source: "manager".into(),
        });
        session.broadcast(ServerFrame::StreamEnd {
            timestamp: Utc::now(),
            reason: "terminated".into(),
        });
    }
}

fn translate_event(event: Event, node_id: Option<String>) -> Option<ServerFrame> {
    let now = Utc::now();
    match event {
        Event::ChatMessage { source, content, .. } => Some(ServerFrame::AgentMessage {
            timestamp: now,
            agent_name: source,
            content,
            summary: None,
            node_id: node_id.unwrap_or_default(),
        }),
        Event::ToolCallRequest { source, calls } => Some(ServerFrame::ToolCall {
            timestamp: now,
            agent_name: source,
            tools: calls
                .into_iter()
                .map(|c| ToolCallSummary {
                    id: c.id,
                    name: c.name,
                    arguments: c.args,
                })
                .collect(),
            node_id: node_id.unwrap_or_default(),
        }),
        Event::ToolCallExecution { source, results } => Some(ServerFrame::ToolExecution {
            timestamp: now,
            agent_name: source,
            results: results
                .into_iter()
                .map(|r| ToolExecutionSummary {
                    tool_call_id: r.call_id,
                    tool_name: r.name,
                    success: r.ok,
                    result: serde_json::Value::String(r.content),
                })
                .collect(),
            node_id: node_id.unwrap_or_default(),
        }),
        Event::StateUpdate {
            state_of_run,
            tool_call_facts,
            handoff_context,
            message_index,
        } => Some(ServerFrame::StateUpdate {
            timestamp: now,
            state_of_run,
            tool_call_facts,
            handoff_context,
            message_index,
        }),
        Event::AnalysisUpdate {
            node_id: analysis_node_id,
            scores,
            triggered,
        } => Some(ServerFrame::AnalysisUpdate {
            timestamp: now,
            node_id: analysis_node_id,
            scores: scores
                .into_iter()
                .map(|s| (s.label, sa_protocol::ComponentScoreDetail { score: s.score, reasoning: s.reasoning }))
                .collect(),
            triggered_components: triggered,
        }),
        Event::StopMessage { content, .. } => Some(ServerFrame::RunTermination {
            timestamp: now,
            status: RunStatus::Interrupted,
            reason: content,
            source: "manager".into(),
        }),
        // Selector scratch output is internal-only (§4.4). A genuine
        // `UserInputRequested` pause is surfaced to observers via
        // `AgentInputQueue`'s pending-request table, not as a generic
        // translated event. `StreamingChunk` has no wire counterpart
        // (SPEC_FULL.md §9 Open Question iii) — only the terminating
        // `ChatMessage` ever reaches an observer.
        Event::SelectorEvent { .. } | Event::UserInputRequested { .. } | Event::StreamingChunk { .. } => None,
    }
}
