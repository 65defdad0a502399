// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod registry;
pub mod tool;

pub use builtin::{EchoTool, GetTimeTool, GetWeatherTool};
pub use registry::{HandlerMap, MiddlewareStage, StaticToolRegistry, ToolRegistry};
pub use tool::ToolHandler;
