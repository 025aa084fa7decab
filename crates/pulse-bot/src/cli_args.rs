use std::path::PathBuf;

use clap::{ArgAction, Parser};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "pulse-bot",
    about = "Slack bot that runs access-controlled Oracle and GoldenGate status scripts",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "slack-app-token",
        env = "PULSE_SLACK_APP_TOKEN",
        hide_env_values = true,
        help = "Slack Socket Mode app token (xapp-...)"
    )]
    pub(crate) slack_app_token: Option<String>,

    #[arg(
        long = "slack-bot-token",
        env = "PULSE_SLACK_BOT_TOKEN",
        hide_env_values = true,
        help = "Slack bot token for Web API (xoxb-...); needs users:read.email for identity lookups"
    )]
    pub(crate) slack_bot_token: Option<String>,

    #[arg(
        long = "slack-bot-user-id",
        env = "PULSE_SLACK_BOT_USER_ID",
        help = "Optional bot user id; resolved with auth.test when omitted"
    )]
    pub(crate) slack_bot_user_id: Option<String>,

    #[arg(
        long = "slack-api-base",
        env = "PULSE_SLACK_API_BASE",
        default_value = "https://slack.com/api",
        help = "Slack Web API base URL"
    )]
    pub(crate) slack_api_base: String,

    #[arg(
        long = "slack-request-timeout-ms",
        env = "PULSE_SLACK_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        help = "Timeout for a single Slack Web API request"
    )]
    pub(crate) slack_request_timeout_ms: u64,

    #[arg(
        long = "slack-reconnect-delay-ms",
        env = "PULSE_SLACK_RECONNECT_DELAY_MS",
        default_value_t = 1_000,
        help = "Delay before reconnecting after socket/session errors"
    )]
    pub(crate) slack_reconnect_delay_ms: u64,

    #[arg(
        long = "slack-retry-max-attempts",
        env = "PULSE_SLACK_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Maximum attempts for retryable slack api failures (429/5xx/transport)"
    )]
    pub(crate) slack_retry_max_attempts: usize,

    #[arg(
        long = "slack-retry-base-delay-ms",
        env = "PULSE_SLACK_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        help = "Base backoff delay in milliseconds for slack api retries"
    )]
    pub(crate) slack_retry_base_delay_ms: u64,

    #[arg(
        long = "permissions-file",
        env = "PULSE_PERMISSIONS_FILE",
        default_value = "permissions.json",
        help = "JSON permission table: {\"admin\": [emails], \"<capability>\": [emails]}"
    )]
    pub(crate) permissions_file: PathBuf,

    #[arg(
        long = "permissions-reload-interval-secs",
        env = "PULSE_PERMISSIONS_RELOAD_INTERVAL_SECS",
        default_value_t = 300,
        help = "Reload the permission file on this interval (0 disables; mentions always reload)"
    )]
    pub(crate) permissions_reload_interval_secs: u64,

    #[arg(
        long = "check-permissions",
        env = "PULSE_CHECK_PERMISSIONS",
        default_value_t = false,
        help = "Validate the permission file, print a summary and exit"
    )]
    pub(crate) check_permissions: bool,

    #[arg(
        long = "static-admin-id",
        env = "PULSE_STATIC_ADMIN_IDS",
        value_delimiter = ',',
        help = "Slack user ids granted admin without identity lookup (comma-separated)"
    )]
    pub(crate) static_admin_ids: Vec<String>,

    #[arg(
        long = "static-grant",
        env = "PULSE_STATIC_GRANTS",
        value_delimiter = ',',
        help = "Static capability grants as <capability>=<slack_user_id> (comma-separated)"
    )]
    pub(crate) static_grants: Vec<String>,

    #[arg(
        long = "bootstrap-identity-id",
        env = "PULSE_BOOTSTRAP_IDENTITY_ID",
        help = "Slack user id allowed when no email can be resolved for it"
    )]
    pub(crate) bootstrap_identity_id: Option<String>,

    #[arg(
        long = "scripts-dir",
        env = "PULSE_SCRIPTS_DIR",
        default_value = "scripts",
        help = "Directory containing tablespace.py, fra.py and gg_status.py"
    )]
    pub(crate) scripts_dir: PathBuf,

    #[arg(
        long = "script-interpreter",
        env = "PULSE_SCRIPT_INTERPRETER",
        default_value = pulse_dispatch::DEFAULT_INTERPRETER,
        help = "Interpreter used to run scripts; empty runs scripts directly"
    )]
    pub(crate) script_interpreter: String,

    #[arg(
        long = "script-timeout-ms",
        env = "PULSE_SCRIPT_TIMEOUT_MS",
        default_value_t = pulse_runner::DEFAULT_SCRIPT_TIMEOUT_MS,
        help = "Kill scripts running longer than this (0 disables the bound)"
    )]
    pub(crate) script_timeout_ms: u64,

    #[arg(
        long = "benign-stderr-marker",
        env = "PULSE_BENIGN_STDERR_MARKER",
        default_value = pulse_runner::DEFAULT_BENIGN_STDERR_MARKER,
        help = "Stderr containing this text is not treated as a failure (empty disables)"
    )]
    pub(crate) benign_stderr_marker: String,

    #[arg(
        long = "credstore-alias",
        env = "PULSE_CREDSTORE_ALIASES",
        value_delimiter = ',',
        help = "GoldenGate credential store aliases accepted by /gg-status lag (comma-separated)"
    )]
    pub(crate) credstore_aliases: Vec<String>,

    #[arg(
        long = "progress-messages",
        env = "PULSE_PROGRESS_MESSAGES",
        default_value_t = true,
        action = ArgAction::Set,
        help = "Post an interim message naming the target before running a script"
    )]
    pub(crate) progress_messages: bool,

    #[arg(
        long = "max-reply-chars",
        env = "PULSE_MAX_REPLY_CHARS",
        default_value_t = pulse_dispatch::DEFAULT_MAX_REPLY_CHARS,
        value_parser = parse_positive_usize,
        help = "Truncate script output in replies beyond this many characters"
    )]
    pub(crate) max_reply_chars: usize,
}
