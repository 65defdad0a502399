// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::Parser;

/// Thin demo CLI exercising [`weft_core::BackgroundAgenticLoop`] end to end.
///
/// Owns no provider wire format, no tool business logic, and no persisted
/// state — it wires a scripted streaming agent and a handful of
/// illustrative tools, then drives one
/// [`weft_core::BackgroundAgenticLoop::execute_run`] call and prints every
/// streamed message to stdout.
#[derive(Parser, Debug)]
#[command(name = "weft-demo", version, about = "Background agentic loop demo")]
pub struct Cli {
    /// The user prompt to submit.
    pub prompt: Vec<String>,

    /// Canned text the scripted agent replies with once its tool calls
    /// (if any) have been resolved.
    #[arg(long, default_value = "Hello from the demo agent.")]
    pub reply: String,

    /// When set, the scripted agent first emits a `get_weather` and a
    /// `get_time` tool call in parallel before replying with `--reply`.
    #[arg(long)]
    pub with_tools: bool,

    /// Thread id stamped on every message this loop instance emits.
    #[arg(long, default_value = "demo-thread")]
    pub thread_id: String,

    /// Optional explicit config file (merged over the default search path).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Write tracing output to stderr instead of staying silent.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}
