//! Slack Socket Mode transport for the Pulse operations bot.
//!
//! Slash commands and app mentions arrive over a Socket Mode websocket and are
//! handed to a [`pulse_dispatch::CommandDispatcher`], one task per request.

mod slack_helpers;
mod slack_runtime;

pub use slack_runtime::{run_slack_bridge, SlackBridgeRuntimeConfig};
