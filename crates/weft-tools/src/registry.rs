// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;

use crate::tool::ToolHandler;

pub type HandlerMap = HashMap<String, Arc<dyn ToolHandler>>;

/// Opaque transform over a boxed message stream — stage 5 of the pipeline,
/// supplied by the tool registry and plugged in unchanged by the loop
/// driver. The core never inspects its contents.
pub type MiddlewareStage =
    Box<dyn Fn(Pin<Box<dyn Stream<Item = serde_json::Value> + Send>>) -> Pin<Box<dyn Stream<Item = serde_json::Value> + Send>> + Send + Sync>;

fn identity_stage() -> MiddlewareStage {
    Box::new(|s| s)
}

/// The tool registry contract the core consumes:
/// `build_tool_components(name) -> (middleware, handlers_map)`.
pub trait ToolRegistry: Send + Sync {
    fn build_tool_components(&self) -> (MiddlewareStage, HandlerMap);
}

/// A simple in-memory registry: a fixed handler map plugged into the
/// identity middleware stage. Sufficient for the demo binary and for test
/// fixtures exercising the dispatcher — approval policies, execution modes,
/// and a larger catalog of built-in tools are registry business logic that
/// lives elsewhere, not part of this contract.
#[derive(Default)]
pub struct StaticToolRegistry {
    handlers: HandlerMap,
}

impl StaticToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn names(&self) -> Vec<String> {
        let mut n: Vec<String> = self.handlers.keys().cloned().collect();
        n.sort();
        n
    }
}

impl ToolRegistry for StaticToolRegistry {
    fn build_tool_components(&self) -> (MiddlewareStage, HandlerMap) {
        (identity_stage(), self.handlers.clone())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::tool::ToolHandler;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn call(&self, function_args: &str) -> anyhow::Result<String> {
            Ok(format!("echo:{function_args}"))
        }
    }

    #[test]
    fn register_and_names() {
        let mut reg = StaticToolRegistry::new();
        reg.register("echo", Arc::new(EchoTool));
        assert_eq!(reg.names(), vec!["echo".to_string()]);
    }

    #[test]
    fn build_tool_components_returns_registered_handlers() {
        let mut reg = StaticToolRegistry::new();
        reg.register("echo", Arc::new(EchoTool));
        let (_, handlers) = reg.build_tool_components();
        assert!(handlers.contains_key("echo"));
    }

    #[tokio::test]
    async fn handler_resolved_from_components_executes() {
        let mut reg = StaticToolRegistry::new();
        reg.register("echo", Arc::new(EchoTool));
        let (_, handlers) = reg.build_tool_components();
        let h = handlers.get("echo").unwrap();
        assert_eq!(h.call("{}").await.unwrap(), "echo:{}");
    }
}
