// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_max_turns_per_run() -> u32 {
    50
}
fn default_input_capacity() -> usize {
    100
}
fn default_output_capacity() -> usize {
    1000
}
fn default_stop_timeout_secs() -> u64 {
    30
}

/// Back-pressure policy for a bounded queue.
///
/// Only [`BackpressureMode::Wait`] is implemented by `weft-core` — every
/// queue blocks its writer rather than drop. The enum stays open so a
/// future drop-oldest policy can be added without widening a closed type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackpressureMode {
    #[default]
    Wait,
}

impl std::fmt::Display for BackpressureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackpressureMode::Wait => write!(f, "wait"),
        }
    }
}

/// Configurable caps for one `weft_core::BackgroundAgenticLoop` instance.
///
/// Defaults: input queue 100, per-subscriber output queue 1000, max turns
/// per run 50, stop timeout 30s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_max_turns_per_run")]
    pub max_turns_per_run: u32,
    #[serde(default = "default_input_capacity")]
    pub input_capacity: usize,
    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
    #[serde(default)]
    pub backpressure: BackpressureMode,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_turns_per_run: default_max_turns_per_run(),
            input_capacity: default_input_capacity(),
            output_capacity: default_output_capacity(),
            stop_timeout_secs: default_stop_timeout_secs(),
            backpressure: BackpressureMode::Wait,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub r#loop: LoopConfig,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
