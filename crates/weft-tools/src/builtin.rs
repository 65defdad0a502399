// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! A handful of illustrative demo tools used by the `src/` demo binary and
//! by integration tests. Not part of the core's contract — callers supply
//! their own [`crate::tool::ToolHandler`] implementations in production.
use async_trait::async_trait;
use serde_json::Value;

use crate::tool::ToolHandler;

/// Echoes its `text` argument back. Used to exercise the single-tool-call
/// path end to end.
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, function_args: &str) -> anyhow::Result<String> {
        let args: Value = if function_args.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(function_args)?
        };
        let text = args.get("text").and_then(Value::as_str).unwrap_or("");
        Ok(format!("echo: {text}"))
    }
}

/// Returns a canned weather report for a city. Used alongside
/// [`GetTimeTool`] in tests exercising two parallel tool calls.
pub struct GetWeatherTool;

#[async_trait]
impl ToolHandler for GetWeatherTool {
    async fn call(&self, function_args: &str) -> anyhow::Result<String> {
        let args: Value = if function_args.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(function_args)?
        };
        let city = args.get("city").and_then(Value::as_str).unwrap_or("?");
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        Ok(format!(r#"{{"city":"{city}","forecast":"sunny"}}"#))
    }
}

/// Returns a canned time-of-day for a timezone. Used alongside
/// [`GetWeatherTool`] in scenario S2.
pub struct GetTimeTool;

#[async_trait]
impl ToolHandler for GetTimeTool {
    async fn call(&self, function_args: &str) -> anyhow::Result<String> {
        let args: Value = if function_args.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(function_args)?
        };
        let tz = args.get("tz").and_then(Value::as_str).unwrap_or("UTC");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        Ok(format!(r#"{{"tz":"{tz}","time":"12:00"}}"#))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_tool_returns_text() {
        let out = EchoTool.call(r#"{"text":"hi"}"#).await.unwrap();
        assert_eq!(out, "echo: hi");
    }

    #[tokio::test]
    async fn get_weather_tool_reports_city() {
        let out = GetWeatherTool.call(r#"{"city":"SF"}"#).await.unwrap();
        assert!(out.contains("SF"));
    }

    #[tokio::test]
    async fn get_time_tool_defaults_tz_to_utc() {
        let out = GetTimeTool.call("").await.unwrap();
        assert!(out.contains("UTC"));
    }
}
