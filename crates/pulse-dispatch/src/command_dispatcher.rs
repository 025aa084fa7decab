//! Routes slash commands through access checks to the script runner.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulse_access::{AccessController, AccessQuery, PermissionReloadReport, PermissionStore};
use pulse_runner::ProcessRunner;
use tokio::task::JoinHandle;

use crate::{
    parse_capability_request, progress_line, render_help, render_reload_report,
    render_script_outcome, render_unknown_command, render_usage_hint, Capability,
    HelpListing, TargetDisplayNames, DEFAULT_MAX_REPLY_CHARS, DENIAL_MESSAGE,
};


pub const CONTROL_COMMAND: &str = "/pulse";
pub const DEFAULT_INTERPRETER: &str = "python3";

/// One slash command as delivered by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Command name as typed, e.g. `/tablespace`.
    pub capability: String,
    pub raw_argument_text: String,
    pub requester_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// `None` executes the script path directly.
    pub interpreter: Option<PathBuf>,
    pub scripts_dir: PathBuf,
    /// Credential store aliases accepted by `/gg-status ... lag <alias>`.
    pub credstore_aliases: Vec<String>,
    pub target_names: TargetDisplayNames,
    pub max_reply_chars: usize,
    pub post_progress: bool,
}

impl DispatcherConfig {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: Some(PathBuf::from(DEFAULT_INTERPRETER)),
            scripts_dir: scripts_dir.into(),
            credstore_aliases: Vec::new(),
            target_names: TargetDisplayNames::default(),
            max_reply_chars: DEFAULT_MAX_REPLY_CHARS,
            post_progress: true,
        }
    }

    pub fn script_path(&self, capability: Capability) -> PathBuf {
        self.scripts_dir.join(capability.script_name())
    }
}

/// Receives interim messages while a command is still running.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn progress(&self, text: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgressSink;

#[async_trait]
impl ProgressSink for NoopProgressSink {
    async fn progress(&self, _text: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    UnknownCommand,
    Denied,
    Usage,
    Succeeded,
    Failed,
    Informational,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReply {
    pub status: DispatchStatus,
    pub text: String,
}

impl DispatchReply {
    fn new(status: DispatchStatus, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
        }
    }

    fn denied() -> Self {
        Self::new(DispatchStatus::Denied, DENIAL_MESSAGE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlCommand {
    Help,
    WhoAmI,
    Reload,
}

fn parse_control_command(raw_argument_text: &str) -> Option<ControlCommand> {
    let mut tokens = raw_argument_text.split_whitespace();
    let command = match tokens.next().map(str::to_ascii_lowercase).as_deref() {
        None | Some("help") => ControlCommand::Help,
        Some("whoami") => ControlCommand::WhoAmI,
        Some("reload") => ControlCommand::Reload,
        Some(_) => return None,
    };
    tokens.next().is_none().then_some(command)
}

fn is_control_command(command: &str) -> bool {
    let command = command.trim();
    command.eq_ignore_ascii_case(CONTROL_COMMAND)
        || command.eq_ignore_ascii_case(&CONTROL_COMMAND[1..])
}

pub struct CommandDispatcher {
    access: Arc<AccessController>,
    runner: ProcessRunner,
    config: DispatcherConfig,
}

impl CommandDispatcher {
    pub fn new(
        access: Arc<AccessController>,
        runner: ProcessRunner,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            access,
            runner,
            config,
        }
    }

    pub fn access(&self) -> &Arc<AccessController> {
        &self.access
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub async fn dispatch(
        &self,
        invocation: &CommandInvocation,
        progress: &dyn ProgressSink,
    ) -> DispatchReply {
        let reply = if let Some(capability) = Capability::from_command(&invocation.capability) {
            self.dispatch_capability(capability, invocation, progress)
                .await
        } else if is_control_command(&invocation.capability) {
            self.dispatch_control(invocation).await
        } else {
            DispatchReply::new(
                DispatchStatus::UnknownCommand,
                render_unknown_command(&invocation.capability),
            )
        };
        tracing::info!(
            requester = %invocation.requester_id,
            command = %invocation.capability,
            status = ?reply.status,
            "command dispatched"
        );
        reply
    }

    /// Mentions reload the permission file, then answer with the help listing.
    pub async fn handle_mention(&self, requester_id: &str) -> DispatchReply {
        let report = self.reload_permissions().await;
        let listing = self.help_listing(requester_id).await;
        let mut text = render_help(&listing);
        if listing.admin {
            text.push_str("\n\n");
            text.push_str(&render_reload_report(&report));
        }
        DispatchReply::new(DispatchStatus::Informational, text)
    }

    pub async fn reload_permissions(&self) -> PermissionReloadReport {
        reload_permission_store(Arc::clone(self.access.permission_store())).await
    }

    pub async fn help_listing(&self, requester_id: &str) -> HelpListing {
        let mut commands = Vec::new();
        for capability in Capability::ALL {
            let query = AccessQuery::capability(requester_id, capability.permission_key());
            if self.access.check(&query).await {
                commands.push(capability);
            }
        }
        let admin = self.access.check(&AccessQuery::admin(requester_id)).await;
        HelpListing { commands, admin }
    }

    async fn dispatch_capability(
        &self,
        capability: Capability,
        invocation: &CommandInvocation,
        progress: &dyn ProgressSink,
    ) -> DispatchReply {
        let request = parse_capability_request(
            capability,
            &invocation.raw_argument_text,
            &self.config.credstore_aliases,
        );

        let query = AccessQuery::capability(&invocation.requester_id, capability.permission_key());
        if !self.access.decide(&query).await.is_allowed() {
            return DispatchReply::denied();
        }

        let request = match request {
            Ok(request) => request,
            Err(hint) => {
                return DispatchReply::new(DispatchStatus::Usage, render_usage_hint(&hint.message))
            }
        };

        let target = self.config.target_names.for_request(&request);
        if self.config.post_progress {
            progress
                .progress(&progress_line(&request, &self.config.target_names))
                .await;
        }

        let script = self.config.script_path(capability);
        let (executable, args) = self.command_line(&script, request.script_args());
        tracing::debug!(
            requester = %invocation.requester_id,
            executable = %executable.display(),
            args = ?args,
            "running capability script"
        );
        let outcome = self.runner.run(&executable, &args).await;
        let status = if outcome.succeeded {
            DispatchStatus::Succeeded
        } else {
            tracing::warn!(
                requester = %invocation.requester_id,
                capability = capability.permission_key(),
                error = %outcome.output,
                "capability script failed"
            );
            DispatchStatus::Failed
        };
        DispatchReply::new(
            status,
            render_script_outcome(capability, target, &outcome, self.config.max_reply_chars),
        )
    }

    fn command_line(&self, script: &Path, flags: Vec<String>) -> (PathBuf, Vec<String>) {
        match &self.config.interpreter {
            Some(interpreter) => {
                let mut args = Vec::with_capacity(flags.len() + 1);
                args.push(script.to_string_lossy().into_owned());
                args.extend(flags);
                (interpreter.clone(), args)
            }
            None => (script.to_path_buf(), flags),
        }
    }

    async fn dispatch_control(&self, invocation: &CommandInvocation) -> DispatchReply {
        let Some(command) = parse_control_command(&invocation.raw_argument_text) else {
            return DispatchReply::new(
                DispatchStatus::Usage,
                render_usage_hint("Usage: /pulse [help|whoami|reload]"),
            );
        };
        let requester_id = invocation.requester_id.as_str();
        match command {
            ControlCommand::Help => {
                let listing = self.help_listing(requester_id).await;
                DispatchReply::new(DispatchStatus::Informational, render_help(&listing))
            }
            ControlCommand::WhoAmI => self.whoami(requester_id).await,
            ControlCommand::Reload => {
                if !self.access.check(&AccessQuery::admin(requester_id)).await {
                    return DispatchReply::denied();
                }
                let report = self.reload_permissions().await;
                let status = if report.applied {
                    DispatchStatus::Informational
                } else {
                    DispatchStatus::Failed
                };
                DispatchReply::new(status, render_reload_report(&report))
            }
        }
    }

    async fn whoami(&self, requester_id: &str) -> DispatchReply {
        let identity_line = match self.access.identity_resolver().resolve(requester_id).await {
            Ok(identity) => format!(
                "You are *{}* (`{}`), email: {}.",
                identity.display_name,
                identity.id,
                identity.email.as_deref().unwrap_or("none resolved")
            ),
            Err(error) => format!("Your identity could not be resolved: {error}."),
        };
        let any_capability = self
            .access
            .check(&AccessQuery::any_capability(requester_id))
            .await;
        let admin = self.access.check(&AccessQuery::admin(requester_id)).await;
        DispatchReply::new(
            DispatchStatus::Informational,
            format!(
                "{identity_line}\nPermission file grants a capability: {}\nAdmin: {}",
                yes_no(any_capability),
                yes_no(admin)
            ),
        )
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Runs [`PermissionStore::reload`] on the blocking pool.
pub async fn reload_permission_store(store: Arc<PermissionStore>) -> PermissionReloadReport {
    let retained = Arc::clone(&store);
    match tokio::task::spawn_blocking(move || store.reload()).await {
        Ok(report) => report,
        Err(error) => {
            tracing::warn!(error = %error, "permission reload task failed");
            PermissionReloadReport {
                applied: false,
                reason_code: "permission_reload_task_failed".to_string(),
                entries: retained.current().len(),
                diagnostics: vec![error.to_string()],
            }
        }
    }
}

/// Reloads `store` every `interval`, independent of chat traffic.
///
/// Returns `None` when `interval` is zero. The first reload happens one
/// interval after spawning.
pub fn spawn_permission_reload_task(
    store: Arc<PermissionStore>,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = reload_permission_store(Arc::clone(&store)).await;
            tracing::debug!(
                applied = report.applied,
                reason_code = %report.reason_code,
                entries = report.entries,
                "scheduled permission reload"
            );
        }
    }))
}
