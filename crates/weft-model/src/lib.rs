// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod message;
pub mod mock;
pub mod provider;

pub use message::{
    Message, MessageMeta, RunAssignment, RunCompletedData, ToolCallData, ToolResultData,
    UserInput,
};
pub use mock::ScriptedStreamingAgent;
pub use provider::{MessageStream, StreamingAgent, TurnOptions};
