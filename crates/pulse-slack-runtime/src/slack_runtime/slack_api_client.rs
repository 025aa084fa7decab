//! Slack Web API calls used by the Socket Mode bridge.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::slack_helpers::{
    is_retryable_slack_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_slack, SLACK_MAX_TEXT_CHARS,
};

const RETRY_ATTEMPT_HEADER: &str = "x-pulse-retry-attempt";
const ERROR_BODY_PREVIEW_CHARS: usize = 800;

/// The `ok`/`error` frame Slack wraps around every Web API body.
#[derive(Debug, Deserialize)]
pub(super) struct SlackWebResponse<T> {
    pub(super) ok: bool,
    #[serde(default)]
    pub(super) error: Option<String>,
    #[serde(flatten)]
    pub(super) body: T,
}

impl<T> SlackWebResponse<T> {
    fn into_body(self, method: &str) -> Result<T> {
        if !self.ok {
            bail!(
                "slack {method} failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(self.body)
    }
}

#[derive(Debug, Deserialize)]
struct AuthTestBody {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpenBody {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageBody {
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UsersInfoBody {
    #[serde(default)]
    pub(super) user: Option<SlackUser>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SlackUser {
    pub(super) id: String,
    #[serde(default)]
    pub(super) name: Option<String>,
    #[serde(default)]
    pub(super) real_name: Option<String>,
    #[serde(default)]
    pub(super) profile: SlackUserProfile,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct SlackUserProfile {
    #[serde(default)]
    pub(super) email: Option<String>,
    #[serde(default)]
    pub(super) display_name: Option<String>,
    #[serde(default)]
    pub(super) real_name: Option<String>,
}

fn required_field(value: Option<String>, method: &str, field: &str) -> Result<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("slack {method} response missing {field}"))
}

#[derive(Clone)]
pub(super) struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    app_token: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl SlackApiClient {
    pub(super) fn new(
        api_base: String,
        app_token: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("pulse-slack-bridge")
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            app_token: app_token.trim().to_string(),
            bot_token: bot_token.trim().to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    pub(super) async fn resolve_bot_user_id(&self) -> Result<String> {
        let body = self
            .call::<AuthTestBody, _>("auth.test", |url| {
                self.http.post(url).bearer_auth(&self.bot_token)
            })
            .await?
            .into_body("auth.test")?;
        required_field(body.user_id, "auth.test", "user_id")
    }

    pub(super) async fn open_socket_connection(&self) -> Result<String> {
        let body = self
            .call::<ConnectionsOpenBody, _>("apps.connections.open", |url| {
                self.http.post(url).bearer_auth(&self.app_token)
            })
            .await?
            .into_body("apps.connections.open")?;
        required_field(body.url, "apps.connections.open", "url")
    }

    /// `ok: false` is returned to the caller so a missing user can be told
    /// apart from an unavailable API.
    pub(super) async fn users_info(
        &self,
        user_id: &str,
    ) -> Result<SlackWebResponse<UsersInfoBody>> {
        self.call("users.info", |url| {
            self.http
                .get(url)
                .bearer_auth(&self.bot_token)
                .query(&[("user", user_id)])
        })
        .await
    }

    pub(super) async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<()> {
        let mut payload = json!({
            "channel": channel,
            "text": truncate_for_slack(text, SLACK_MAX_TEXT_CHARS),
            "mrkdwn": true,
            "unfurl_links": false,
        });
        if let Some(thread_ts) = thread_ts {
            payload["thread_ts"] = Value::String(thread_ts.to_string());
        }
        let body = self
            .call::<PostMessageBody, _>("chat.postMessage", |url| {
                self.http.post(url).bearer_auth(&self.bot_token).json(&payload)
            })
            .await?
            .into_body("chat.postMessage")?;
        tracing::debug!(channel, ts = ?body.ts, "posted slack message");
        Ok(())
    }

    /// Posts a visible reply through a slash command's `response_url`.
    pub(super) async fn post_to_response_url(&self, response_url: &str, text: &str) -> Result<()> {
        let payload = json!({
            "response_type": "in_channel",
            "replace_original": false,
            "text": truncate_for_slack(text, SLACK_MAX_TEXT_CHARS),
        });
        self.send_with_retry("response_url", || self.http.post(response_url).json(&payload))
            .await?;
        Ok(())
    }

    async fn call<T, F>(&self, method: &str, build: F) -> Result<SlackWebResponse<T>>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let url = format!("{}/{method}", self.api_base);
        self.send_with_retry(method, || build(&url))
            .await?
            .json::<SlackWebResponse<T>>()
            .await
            .with_context(|| format!("failed to decode slack {method} response"))
    }

    /// Sends until a 2xx arrives, retrying 429/5xx and transient transport
    /// errors up to `retry_max_attempts` in total.
    async fn send_with_retry<F>(&self, operation: &str, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt += 1;
            let exhausted = attempt >= self.retry_max_attempts;
            let sent = build()
                .header(RETRY_ATTEMPT_HEADER, (attempt - 1).to_string())
                .send()
                .await;
            let delay = match sent {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    if exhausted || !is_retryable_slack_status(status) {
                        let body = response.text().await.unwrap_or_default();
                        bail!(
                            "slack {operation} returned status {status}: {}",
                            truncate_for_slack(&body, ERROR_BODY_PREVIEW_CHARS)
                        );
                    }
                    let retry_after = parse_retry_after(response.headers());
                    retry_delay(self.retry_base_delay_ms, attempt, retry_after)
                }
                Err(error) if !exhausted && is_retryable_transport_error(&error) => {
                    retry_delay(self.retry_base_delay_ms, attempt, None)
                }
                Err(error) => {
                    return Err(error).with_context(|| format!("slack {operation} request failed"))
                }
            };
            tracing::debug!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying slack api request"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
