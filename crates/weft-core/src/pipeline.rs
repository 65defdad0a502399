// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use weft_model::Message;
use weft_tools::MiddlewareStage;

use crate::hub::{MessageStream, PublishingHub};

/// An opaque, behavior-preserving transform over the message stream —
/// stands in for pipeline stages 1, 2, 4 and (via [`adapt_middleware`])
/// stage 5, none of which this crate implements; only stage 3 (publishing)
/// and what the core consumes are specified here.
pub type Stage = Box<dyn Fn(MessageStream) -> MessageStream + Send + Sync>;

/// A stage that forwards every message unchanged. Used as the default for
/// the four stages this crate does not implement, which stay opaque and
/// external from this crate's point of view.
pub fn identity_stage() -> Stage {
    Box::new(|s| s)
}

/// Assigns a monotonic `order_idx` to every message's envelope. A
/// convenience default for stage 1 (assigning a monotonic message order
/// index); not itself mandatory behavior of this crate — callers with a
/// real stage 1 implementation should supply their own `Stage` instead.
pub fn monotonic_order_idx_stage() -> Stage {
    let counter = Arc::new(AtomicU64::new(0));
    Box::new(move |s: MessageStream| -> MessageStream {
        let counter = counter.clone();
        Box::pin(s.map(move |mut m| {
            let idx = counter.fetch_add(1, Ordering::Relaxed);
            m.meta_mut().order_idx = Some(idx);
            m
        }))
    })
}

/// Adapts a [`MiddlewareStage`] (a `serde_json::Value` transform, the shape
/// a tool registry's middleware stage 5 hook returns) into a [`Stage`] over
/// `Message`, round-tripping through `serde_json`. A message that fails to
/// deserialize back out of the middleware is dropped with a warning —
/// the registry's middleware is expected to be structure-preserving.
pub fn adapt_middleware(middleware: MiddlewareStage) -> Stage {
    Box::new(move |s: MessageStream| -> MessageStream {
        let values = s.map(|m| serde_json::to_value(&m).unwrap_or(serde_json::Value::Null));
        let transformed = middleware(Box::pin(values));
        Box::pin(transformed.filter_map(|v| async move {
            match serde_json::from_value::<Message>(v) {
                Ok(m) => Some(m),
                Err(e) => {
                    tracing::warn!(error = %e, "middleware stage produced a non-Message value; dropping");
                    None
                }
            }
        }))
    })
}

/// Stage 3 — the one stage this crate implements. Forwards every message
/// downstream unchanged and publishes a clone to the hub as a side effect.
/// Placement is mandatory: called upstream of the joiner.
fn publishing_stage(s: MessageStream, hub: Arc<PublishingHub>) -> MessageStream {
    Box::pin(s.then(move |m| {
        let hub = hub.clone();
        async move {
            hub.publish(m.clone()).await;
            m
        }
    }))
}

/// Assembles the fixed five-stage pipeline around a raw provider stream.
///
/// `pre_publish` stands in for stages 1+2 (message transformation, JSON
/// fragment stitching); `post_publish` stands in for stages 4+5 (message
/// joiner, tool-contract injector). Defaults to [`identity_stage`] for
/// either when the caller has no real implementation — both stay opaque,
/// behavior-preserving transformers from this crate's point of view.
///
/// Wraps the raw provider stream the same way a hard-coded accumulation
/// pass would, but as an ordered list of pluggable stage transforms instead.
pub fn assemble(
    raw: MessageStream,
    hub: Arc<PublishingHub>,
    pre_publish: Stage,
    post_publish: Stage,
) -> MessageStream {
    let staged = pre_publish(raw);
    let published = publishing_stage(staged, hub);
    post_publish(published)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
