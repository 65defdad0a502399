// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

/// A single tool handler: `function_args -> future<string>`.
///
/// The handler table supplied by the external tool registry maps function
/// names to implementations of this trait. Input is the raw
/// `function_args` string (the dispatcher defaults it to the literal `{}`
/// when a call carries no args); output is a string payload, typically
/// JSON-encoded.
///
/// Deliberately narrow: approval policy, execution modes, and output
/// categorization belong to the tool registry's own business logic, not to
/// the name-to-handler contract this core dispatches through.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, function_args: &str) -> anyhow::Result<String>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(&str) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<String>> + Send,
{
    async fn call(&self, function_args: &str) -> anyhow::Result<String> {
        (self)(function_args).await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
