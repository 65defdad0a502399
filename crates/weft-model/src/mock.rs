// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::watch;

use crate::message::{Message, MessageMeta, ToolCallData};
use crate::provider::{MessageStream, StreamingAgent, TurnOptions};

/// A pre-scripted streaming agent for tests. Each call to
/// `generate_streaming` pops the next response script from the front of the
/// queue, letting tests specify exact message sequences — including tool
/// calls — without a live provider.
pub struct ScriptedStreamingAgent {
    scripts: Arc<Mutex<Vec<Vec<Message>>>>,
    /// The last per-turn options seen, so tests can inspect what was sent.
    pub last_options: Arc<Mutex<Option<TurnOptions>>>,
}

impl ScriptedStreamingAgent {
    pub fn new(scripts: Vec<Vec<Message>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_options: Arc::new(Mutex::new(None)),
        }
    }

    /// Convenience: agent that always returns a single text reply then ends.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![vec![Message::TextChunk {
            meta: MessageMeta::default(),
            text: reply.into(),
        }]])
    }

    /// Convenience: agent whose first call returns N parallel tool calls,
    /// and whose second call returns a final text reply.
    pub fn tool_calls_then_text(
        calls: Vec<(&str, &str, &str)>,
        final_text: impl Into<String>,
    ) -> Self {
        let round1 = calls
            .into_iter()
            .map(|(id, name, args)| Message::ToolCall {
                meta: MessageMeta::default(),
                data: ToolCallData {
                    tool_call_id: id.to_string(),
                    function_name: name.to_string(),
                    function_args: args.to_string(),
                },
            })
            .collect();
        Self::new(vec![
            round1,
            vec![Message::TextChunk {
                meta: MessageMeta::default(),
                text: final_text.into(),
            }],
        ])
    }
}

#[async_trait]
impl StreamingAgent for ScriptedStreamingAgent {
    async fn generate_streaming(
        &self,
        _history: &[Message],
        options: TurnOptions,
        _cancel: watch::Receiver<bool>,
    ) -> anyhow::Result<MessageStream> {
        *self.last_options.lock().unwrap() = Some(options);
        let messages = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                vec![Message::TextChunk {
                    meta: MessageMeta::default(),
                    text: "[no more scripts]".into(),
                }]
            } else {
                scripts.remove(0)
            }
        };
        let wrapped: Vec<anyhow::Result<Message>> = messages.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn no_cancel() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn always_text_emits_single_chunk() {
        let agent = ScriptedStreamingAgent::always_text("hello");
        let mut s = agent
            .generate_streaming(&[], TurnOptions::default(), no_cancel())
            .await
            .unwrap();
        let first = s.next().await.unwrap().unwrap();
        match first {
            Message::TextChunk { text, .. } => assert_eq!(text, "hello"),
            _ => panic!("expected TextChunk"),
        }
    }

    #[tokio::test]
    async fn tool_calls_then_text_two_rounds() {
        let agent = ScriptedStreamingAgent::tool_calls_then_text(
            vec![("t1", "get_weather", "{}"), ("t2", "get_time", "{}")],
            "done",
        );
        let mut round1 = agent
            .generate_streaming(&[], TurnOptions::default(), no_cancel())
            .await
            .unwrap();
        let mut calls = Vec::new();
        while let Some(m) = round1.next().await {
            calls.push(m.unwrap());
        }
        assert_eq!(calls.len(), 2);
        assert!(calls
            .iter()
            .all(|m| matches!(m, Message::ToolCall { .. })));

        let mut round2 = agent
            .generate_streaming(&[], TurnOptions::default(), no_cancel())
            .await
            .unwrap();
        let second = round2.next().await.unwrap().unwrap();
        assert!(matches!(second, Message::TextChunk { text, .. } if text == "done"));
    }

    #[tokio::test]
    async fn fallback_when_scripts_exhausted() {
        let agent = ScriptedStreamingAgent::new(vec![]);
        let mut s = agent
            .generate_streaming(&[], TurnOptions::default(), no_cancel())
            .await
            .unwrap();
        let ev = s.next().await.unwrap().unwrap();
        assert!(matches!(ev, Message::TextChunk { text, .. } if text.contains("no more scripts")));
    }

    #[tokio::test]
    async fn last_options_records_run_id() {
        let agent = ScriptedStreamingAgent::always_text("x");
        let opts = TurnOptions {
            run_id: "r1".into(),
            thread_id: "t1".into(),
            generation_id: "g1".into(),
        };
        let _ = agent
            .generate_streaming(&[], opts.clone(), no_cancel())
            .await
            .unwrap();
        let recorded = agent.last_options.lock().unwrap().clone().unwrap();
        assert_eq!(recorded.run_id, "r1");
    }
}
