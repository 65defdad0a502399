// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Error taxonomy for the run-orchestration core.
///
/// `UnknownTool` and `ToolHandlerException` are never returned to a
/// caller — the dispatcher catches them internally and synthesizes a
/// `ToolResult` carrying the matching JSON payload so the model can
/// self-correct. The variants still exist here because
/// `tracing::warn!`/`tracing::error!` call sites record them as
/// structured fields — a `thiserror` enum is kept even for errors that
/// are ultimately handled rather than propagated.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("pipeline stream failed: {0}")]
    PipelineStreamFailure(#[source] anyhow::Error),

    #[error("tool call arrived without a tool_call_id")]
    MissingToolCallId,

    #[error("unknown function: {0}")]
    UnknownTool(String),

    #[error("tool handler raised: {0}")]
    ToolHandlerException(String),

    #[error("subscriber queue closed during publish")]
    SubscriberClosedDuringPublish,

    #[error("loop cancelled")]
    Cancelled,

    #[error("stop() did not complete within the configured timeout")]
    StopTimeout,

    #[error("loop already disposed")]
    Disposed,

    #[error("loop already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, LoopError>;
