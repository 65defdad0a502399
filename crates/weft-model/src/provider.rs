// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::watch;

use crate::message::Message;

/// Per-turn options overlaid on the default options template with `run_id`
/// and `thread_id` before each pipeline invocation.
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    pub run_id: String,
    pub thread_id: String,
    pub generation_id: String,
}

pub type MessageStream = Pin<Box<dyn Stream<Item = anyhow::Result<Message>> + Send>>;

/// The streaming-agent contract the core consumes.
///
/// Narrowed to exactly the one method this core calls: produce a lazy,
/// cancellable stream of messages from conversation history plus per-turn
/// options. Provider connectivity, credentials, and wire format are out of
/// scope — left to implementors.
#[async_trait]
pub trait StreamingAgent: Send + Sync {
    async fn generate_streaming(
        &self,
        history: &[Message],
        options: TurnOptions,
        cancel: watch::Receiver<bool>,
    ) -> anyhow::Result<MessageStream>;
}
