// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use tokio::sync::watch;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::Cli;
use weft_core::BackgroundAgenticLoop;
use weft_model::{ScriptedStreamingAgent, UserInput};
use weft_tools::{EchoTool, GetTimeTool, GetWeatherTool, StaticToolRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = weft_config::load(cli.config.as_deref())?.r#loop;

    let mut registry = StaticToolRegistry::new();
    registry.register("echo", Arc::new(EchoTool));
    registry.register("get_weather", Arc::new(GetWeatherTool));
    registry.register("get_time", Arc::new(GetTimeTool));

    let agent = if cli.with_tools {
        ScriptedStreamingAgent::tool_calls_then_text(
            vec![("t1", "get_weather", r#"{"city":"SF"}"#), ("t2", "get_time", r#"{"tz":"PST"}"#)],
            cli.reply.clone(),
        )
    } else {
        ScriptedStreamingAgent::always_text(cli.reply.clone())
    };

    let loop_ = Arc::new(BackgroundAgenticLoop::new(
        Arc::new(agent),
        Arc::new(registry),
        cli.thread_id.clone(),
        config,
    ));

    let (_external_tx, external_rx) = watch::channel(false);
    loop_.start(external_rx)?;

    let prompt = if cli.prompt.is_empty() {
        "hello".to_string()
    } else {
        cli.prompt.join(" ")
    };

    let mut stream = loop_.execute_run(UserInput::text("user", prompt)).await?;
    while let Some(message) = stream.next().await {
        print_message(&message);
    }

    loop_.dispose().await;
    Ok(())
}

fn print_message(message: &weft_model::Message) {
    match message {
        weft_model::Message::RunAssignment { data, .. } => {
            println!("[assigned] run={} injected={}", data.run_id, data.was_injected);
        }
        weft_model::Message::TextChunk { text, .. } => println!("{text}"),
        weft_model::Message::ReasoningChunk { text, .. } => println!("(reasoning) {text}"),
        weft_model::Message::ToolCall { data, .. } => {
            println!("[tool_call] {} {}({})", data.tool_call_id, data.function_name, data.function_args);
        }
        weft_model::Message::ToolResult { data, .. } => {
            println!("[tool_result] {} -> {}", data.tool_call_id, data.result);
        }
        weft_model::Message::RunCompleted { data, .. } => {
            println!(
                "[completed] run={} forked={} forked_to={:?}",
                data.run_id, data.was_forked, data.forked_to_run_id
            );
        }
        weft_model::Message::Other { payload, .. } => println!("[other] {payload}"),
    }
}

/// Stays silent unless the caller opts in with `-v`, since stdout here is
/// the demo's actual output.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("off")
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
