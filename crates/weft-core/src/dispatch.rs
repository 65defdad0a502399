// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use tracing::{error, warn};
use weft_model::{Message, MessageMeta, ToolResultData};
use weft_tools::HandlerMap;

/// Maps each `ToolCall` to its handler, invokes it, and produces a
/// `ToolResult` referencing the original `tool_call_id`.
///
/// Unknown-tool and handler-exception cases are caught here and turned into
/// a structured JSON error payload rather than a plain string, so callers
/// get a machine-parseable result either way. Calls fan out in parallel with
/// `tokio::spawn`; results are returned in the original call order (not
/// completion order).
pub async fn dispatch_calls(calls: Vec<Message>, handlers: &HandlerMap) -> Vec<Message> {
    let available = sorted_names(handlers);

    let mut handles = Vec::with_capacity(calls.len());
    for call in calls {
        match call {
            Message::ToolCall { meta, data } => {
                handles.push(spawn_one(meta, data, handlers, available.clone()));
            }
            other => {
                // The driver only ever passes ToolCall messages here; this
                // branch exists so the function stays total.
                handles.push(tokio::spawn(async move { other }));
            }
        }
    }

    let mut results = Vec::with_capacity(handles.len());
    for h in handles {
        match h.await {
            Ok(m) => results.push(m),
            Err(e) => {
                error!(error = %e, "tool dispatch task panicked");
            }
        }
    }
    results
}

pub(crate) fn sorted_names(handlers: &HandlerMap) -> Vec<String> {
    let mut names: Vec<String> = handlers.keys().cloned().collect();
    names.sort();
    names
}

/// Spawns one call's execution immediately, not waiting for the turn's
/// stream to end. Shared by the batched [`dispatch_calls`] (used by tests)
/// and the driver's
/// per-message dispatch inside a turn's stream iteration.
pub(crate) fn spawn_one(
    meta: MessageMeta,
    data: weft_model::ToolCallData,
    handlers: &HandlerMap,
    available: Vec<String>,
) -> tokio::task::JoinHandle<Message> {
    let handler = handlers.get(&data.function_name).cloned();
    tokio::spawn(async move {
        let args = if data.function_args.is_empty() {
            "{}".to_string()
        } else {
            data.function_args.clone()
        };
        let result = match handler {
            None => {
                warn!(function = %data.function_name, "unknown function in tool dispatch");
                serde_json::json!({
                    "error": format!("Unknown function: {}", data.function_name),
                    "available_functions": available,
                })
                .to_string()
            }
            Some(h) => match h.call(&args).await {
                Ok(result) => result,
                Err(e) => {
                    error!(function = %data.function_name, error = %e, "tool handler raised");
                    serde_json::json!({ "error": e.to_string() }).to_string()
                }
            },
        };

        let result_meta = MessageMeta {
            run_id: meta.run_id.clone(),
            generation_id: meta.generation_id.clone(),
            thread_id: meta.thread_id.clone(),
            order_idx: None,
            agent: meta.agent.clone(),
            // ToolResult role is always fixed to "user", never inherited
            // from the ToolCall it answers.
            role: Some("user".to_string()),
        };

        Message::ToolResult {
            meta: result_meta,
            data: ToolResultData {
                tool_call_id: data.tool_call_id,
                result,
            },
        }
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
