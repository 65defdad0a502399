// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope carried by every [`Message`] variant.
///
/// Carries `role` uniformly across every content variant, plus the
/// run/generation/thread correlation fields the loop needs to stamp on
/// every observable event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageMeta {
    pub run_id: Option<String>,
    pub generation_id: Option<String>,
    pub thread_id: Option<String>,
    pub order_idx: Option<u64>,
    pub role: Option<String>,
    pub agent: Option<String>,
}

impl MessageMeta {
    pub fn for_run(run_id: impl Into<String>, generation_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            generation_id: Some(generation_id.into()),
            ..Default::default()
        }
    }
}

/// A completed request to invoke a named function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallData {
    /// Required, unique within its turn. A missing/empty value is a fatal
    /// programming error (§3 invariant 5) — see `weft_core::error::LoopError::MissingToolCallId`.
    pub tool_call_id: String,
    pub function_name: String,
    /// Typically JSON; may be empty for niladic calls.
    pub function_args: String,
}

/// The outcome of a [`ToolCallData`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolResultData {
    pub tool_call_id: String,
    pub result: String,
}

/// Assignment record emitted by the core when an input is accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunAssignment {
    pub run_id: String,
    pub generation_id: String,
    pub input_id: Option<String>,
    pub parent_run_id: Option<String>,
    pub was_injected: bool,
}

/// Run-completion record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunCompletedData {
    pub run_id: String,
    pub was_forked: bool,
    pub forked_to_run_id: Option<String>,
}

/// The polymorphic value produced by the pipeline or injected by the core.
///
/// Variant set is exactly the one spec'd: incremental content chunks, tool
/// call/result pairs, and the two lifecycle events the core itself emits.
/// `Other` forwards anything else (usage, metadata) unchanged — the core
/// never inspects it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum Message {
    TextChunk { meta: MessageMeta, text: String },
    ReasoningChunk { meta: MessageMeta, text: String },
    ToolCall { meta: MessageMeta, data: ToolCallData },
    ToolResult { meta: MessageMeta, data: ToolResultData },
    RunAssignment { meta: MessageMeta, data: RunAssignment },
    RunCompleted { meta: MessageMeta, data: RunCompletedData },
    Other { meta: MessageMeta, payload: Value },
}

impl Message {
    pub fn meta(&self) -> &MessageMeta {
        match self {
            Message::TextChunk { meta, .. }
            | Message::ReasoningChunk { meta, .. }
            | Message::ToolCall { meta, .. }
            | Message::ToolResult { meta, .. }
            | Message::RunAssignment { meta, .. }
            | Message::RunCompleted { meta, .. }
            | Message::Other { meta, .. } => meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut MessageMeta {
        match self {
            Message::TextChunk { meta, .. }
            | Message::ReasoningChunk { meta, .. }
            | Message::ToolCall { meta, .. }
            | Message::ToolResult { meta, .. }
            | Message::RunAssignment { meta, .. }
            | Message::RunCompleted { meta, .. }
            | Message::Other { meta, .. } => meta,
        }
    }

    pub fn run_id(&self) -> Option<&str> {
        self.meta().run_id.as_deref()
    }

    /// Core-emitted messages (RunAssignment, RunCompleted) set `thread_id`
    /// and `role = "system"`. Synthesized ToolResult messages are the
    /// exception: their role is fixed to `"user"` instead, set directly by
    /// the dispatcher rather than through this helper.
    pub fn stamp_system(&mut self, thread_id: &str) {
        let meta = self.meta_mut();
        meta.thread_id = Some(thread_id.to_string());
        meta.role = Some("system".to_string());
    }
}

/// Ordered sequence of messages + optional client-supplied correlation id +
/// optional explicit parent-run id.
#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pub messages: Vec<Message>,
    pub input_id: Option<String>,
    pub parent_run_id: Option<String>,
}

impl UserInput {
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        let meta = MessageMeta {
            role: Some(role.into()),
            ..Default::default()
        };
        Self {
            messages: vec![Message::TextChunk {
                meta,
                text: text.into(),
            }],
            input_id: None,
            parent_run_id: None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
