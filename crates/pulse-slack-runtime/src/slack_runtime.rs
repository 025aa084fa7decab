//! Slack Socket Mode bridge: receives slash commands and mentions, dispatches
//! each on its own task, and posts replies.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use pulse_access::{AccessController, IdentityResolver, PermissionStore, StaticOverride};
use pulse_dispatch::{
    spawn_permission_reload_task, CommandDispatcher, CommandInvocation, DispatcherConfig,
    ProgressSink,
};
use pulse_runner::ProcessRunner;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

mod slack_api_client;
mod slack_identity_directory;

use slack_api_client::SlackApiClient;
use slack_identity_directory::SlackIdentityDirectory;

#[derive(Clone)]
/// Runtime configuration for the Slack bridge transport loop.
pub struct SlackBridgeRuntimeConfig {
    pub api_base: String,
    pub app_token: String,
    pub bot_token: String,
    pub bot_user_id: Option<String>,
    pub request_timeout_ms: u64,
    pub reconnect_delay: Duration,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub permission_store: Arc<PermissionStore>,
    pub static_override: StaticOverride,
    pub bootstrap_identity_id: Option<String>,
    pub runner: ProcessRunner,
    pub dispatcher: DispatcherConfig,
    /// Zero disables the timer; mentions still reload.
    pub permissions_reload_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackSocketEnvelope {
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SlackSlashCommand {
    command: String,
    text: String,
    user_id: String,
    channel_id: String,
    response_url: Option<String>,
}

impl SlackSlashCommand {
    fn invocation(&self) -> CommandInvocation {
        CommandInvocation {
            capability: self.command.clone(),
            raw_argument_text: self.text.clone(),
            requester_id: self.user_id.clone(),
        }
    }

    fn reply_target(&self) -> SlackReplyTarget {
        match &self.response_url {
            Some(url) => SlackReplyTarget::ResponseUrl(url.clone()),
            None => SlackReplyTarget::Channel {
                channel_id: self.channel_id.clone(),
                thread_ts: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SlackMention {
    user_id: String,
    channel_id: String,
    ts: String,
    thread_ts: Option<String>,
}

impl SlackMention {
    fn reply_target(&self) -> SlackReplyTarget {
        SlackReplyTarget::Channel {
            channel_id: self.channel_id.clone(),
            thread_ts: Some(self.thread_ts.clone().unwrap_or_else(|| self.ts.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlackInbound {
    SlashCommand(SlackSlashCommand),
    Mention(SlackMention),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlackReplyTarget {
    ResponseUrl(String),
    Channel {
        channel_id: String,
        thread_ts: Option<String>,
    },
}

impl SlackReplyTarget {
    async fn send(&self, client: &SlackApiClient, text: &str) -> Result<()> {
        match self {
            Self::ResponseUrl(url) => client.post_to_response_url(url, text).await,
            Self::Channel {
                channel_id,
                thread_ts,
            } => {
                client
                    .post_message(channel_id, text, thread_ts.as_deref())
                    .await
            }
        }
    }
}

struct SlackProgressSink<'a> {
    client: &'a SlackApiClient,
    target: &'a SlackReplyTarget,
}

#[async_trait]
impl ProgressSink for SlackProgressSink<'_> {
    async fn progress(&self, text: &str) {
        if let Err(error) = self.target.send(self.client, text).await {
            tracing::warn!(error = %format!("{error:#}"), "failed to post progress message");
        }
    }
}

/// Runs the Slack bridge transport loop until ctrl-c.
pub async fn run_slack_bridge(config: SlackBridgeRuntimeConfig) -> Result<()> {
    let runtime = SlackBridgeRuntime::new(config).await?;
    runtime.run().await
}

struct SlackBridgeRuntime {
    config: SlackBridgeRuntimeConfig,
    slack_client: SlackApiClient,
    dispatcher: Arc<CommandDispatcher>,
    bot_user_id: String,
}

impl SlackBridgeRuntime {
    async fn new(config: SlackBridgeRuntimeConfig) -> Result<Self> {
        let slack_client = SlackApiClient::new(
            config.api_base.clone(),
            config.app_token.clone(),
            config.bot_token.clone(),
            config.request_timeout_ms,
            config.retry_max_attempts,
            config.retry_base_delay_ms,
        )?;

        let bot_user_id = match config.bot_user_id.clone() {
            Some(user_id) if !user_id.trim().is_empty() => user_id.trim().to_string(),
            _ => slack_client
                .resolve_bot_user_id()
                .await
                .context("failed to resolve slack bot user id")?,
        };

        let directory = SlackIdentityDirectory::new(slack_client.clone());
        let access = AccessController::new(
            Arc::clone(&config.permission_store),
            IdentityResolver::new(Arc::new(directory)),
            config.static_override.clone(),
        )
        .with_bootstrap_identity(config.bootstrap_identity_id.clone());
        let dispatcher = CommandDispatcher::new(
            Arc::new(access),
            config.runner.clone(),
            config.dispatcher.clone(),
        );

        Ok(Self {
            config,
            slack_client,
            dispatcher: Arc::new(dispatcher),
            bot_user_id,
        })
    }

    async fn run(&self) -> Result<()> {
        let reload_task = spawn_permission_reload_task(
            Arc::clone(&self.config.permission_store),
            self.config.permissions_reload_interval,
        );
        let result = self.run_connection_loop().await;
        if let Some(task) = reload_task {
            task.abort();
        }
        result
    }

    async fn run_connection_loop(&self) -> Result<()> {
        loop {
            match self.slack_client.open_socket_connection().await {
                Ok(socket_url) => {
                    tracing::info!(
                        bot_user_id = %self.bot_user_id,
                        "slack bridge socket connected"
                    );
                    match self.run_socket_session(&socket_url).await {
                        Ok(SessionEnd::Shutdown) => {
                            tracing::info!("slack bridge shutdown requested");
                            return Ok(());
                        }
                        Ok(SessionEnd::Reconnect) => {
                            tracing::info!("slack bridge socket closed; reconnecting");
                        }
                        Err(error) => {
                            tracing::warn!(
                                error = %format!("{error:#}"),
                                "slack bridge socket session error"
                            );
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        error = %format!("{error:#}"),
                        "slack bridge failed to open socket connection"
                    );
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("slack bridge shutdown requested");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    async fn run_socket_session(&self, socket_url: &str) -> Result<SessionEnd> {
        let (stream, _response) = connect_async(socket_url)
            .await
            .context("failed to connect slack socket mode websocket")?;
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    return Ok(SessionEnd::Shutdown);
                }
                maybe_message = source.next() => {
                    let Some(message_result) = maybe_message else {
                        return Ok(SessionEnd::Reconnect);
                    };
                    let message = message_result.context("failed reading slack websocket message")?;
                    let Some(envelope) = parse_socket_envelope(message)? else {
                        continue;
                    };
                    if let Some(envelope_id) = envelope.envelope_id.as_deref() {
                        ack_envelope(&mut sink, envelope_id).await?;
                    }
                    if envelope.envelope_type == "disconnect" {
                        return Ok(SessionEnd::Reconnect);
                    }
                    self.handle_envelope(&envelope);
                }
            }
        }
    }

    fn handle_envelope(&self, envelope: &SlackSocketEnvelope) {
        let inbound = match normalize_socket_envelope(envelope, &self.bot_user_id) {
            Ok(Some(inbound)) => inbound,
            Ok(None) => return,
            Err(error) => {
                tracing::warn!(
                    envelope_type = %envelope.envelope_type,
                    error = %format!("{error:#}"),
                    "ignoring undecodable slack envelope"
                );
                return;
            }
        };
        let dispatcher = Arc::clone(&self.dispatcher);
        let client = self.slack_client.clone();
        tokio::spawn(async move {
            handle_inbound(&dispatcher, &client, inbound).await;
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Reconnect,
}

async fn ack_envelope<S>(sink: &mut S, envelope_id: &str) -> Result<()>
where
    S: futures_util::Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let ack = json!({ "envelope_id": envelope_id }).to_string();
    sink.send(WsMessage::Text(ack.into()))
        .await
        .context("failed to send slack socket ack")
}

async fn handle_inbound(
    dispatcher: &CommandDispatcher,
    client: &SlackApiClient,
    inbound: SlackInbound,
) {
    match inbound {
        SlackInbound::SlashCommand(command) => {
            let target = command.reply_target();
            let progress = SlackProgressSink {
                client,
                target: &target,
            };
            let reply = dispatcher.dispatch(&command.invocation(), &progress).await;
            if let Err(error) = target.send(client, &reply.text).await {
                tracing::warn!(
                    command = %command.command,
                    channel = %command.channel_id,
                    error = %format!("{error:#}"),
                    "failed to post slash command reply"
                );
            }
        }
        SlackInbound::Mention(mention) => {
            let reply = dispatcher.handle_mention(&mention.user_id).await;
            if let Err(error) = mention.reply_target().send(client, &reply.text).await {
                tracing::warn!(
                    channel = %mention.channel_id,
                    error = %format!("{error:#}"),
                    "failed to post mention reply"
                );
            }
        }
    }
}

fn parse_socket_envelope(message: WsMessage) -> Result<Option<SlackSocketEnvelope>> {
    match message {
        WsMessage::Text(text) => {
            let envelope = serde_json::from_str::<SlackSocketEnvelope>(&text)
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Binary(bytes) => {
            let envelope = serde_json::from_slice::<SlackSocketEnvelope>(&bytes)
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
            Ok(None)
        }
    }
}

#[derive(Debug, Deserialize)]
struct SlackSlashCommandPayload {
    command: String,
    #[serde(default)]
    text: String,
    user_id: String,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    response_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackEventCallbackEnvelope {
    #[serde(rename = "type")]
    callback_type: String,
    event: SlackEventPayload,
}

#[derive(Debug, Deserialize)]
struct SlackEventPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn normalize_socket_envelope(
    envelope: &SlackSocketEnvelope,
    bot_user_id: &str,
) -> Result<Option<SlackInbound>> {
    match envelope.envelope_type.as_str() {
        "slash_commands" => {
            let payload =
                serde_json::from_value::<SlackSlashCommandPayload>(envelope.payload.clone())
                    .context("failed to decode slack slash command payload")?;
            let Some(user_id) = non_blank(Some(payload.user_id)) else {
                return Ok(None);
            };
            Ok(Some(SlackInbound::SlashCommand(SlackSlashCommand {
                command: payload.command.trim().to_string(),
                text: payload.text,
                user_id,
                channel_id: payload.channel_id,
                response_url: non_blank(payload.response_url),
            })))
        }
        "events_api" => {
            let callback =
                serde_json::from_value::<SlackEventCallbackEnvelope>(envelope.payload.clone())
                    .context("failed to decode slack event callback payload")?;
            if callback.callback_type != "event_callback" {
                return Ok(None);
            }
            let event = callback.event;
            if event.event_type != "app_mention" || event.subtype.as_deref() == Some("bot_message")
            {
                return Ok(None);
            }
            let Some(user_id) = non_blank(event.user) else {
                return Ok(None);
            };
            if user_id == bot_user_id {
                return Ok(None);
            }
            let (Some(channel_id), Some(ts)) = (non_blank(event.channel), non_blank(event.ts))
            else {
                return Ok(None);
            };
            Ok(Some(SlackInbound::Mention(SlackMention {
                user_id,
                channel_id,
                ts,
                thread_ts: non_blank(event.thread_ts),
            })))
        }
        _ => Ok(None),
    }
}
