//! Startup sequencing: validate configuration, load permissions, then run the
//! Slack bridge.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use pulse_access::{PermissionStore, StaticOverride};
use pulse_dispatch::{DispatcherConfig, TargetDisplayNames};
use pulse_runner::{ProcessRunner, ProcessRunnerConfig};
use pulse_slack_runtime::{run_slack_bridge, SlackBridgeRuntimeConfig};

use crate::cli_args::Cli;

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    if cli.check_permissions {
        return check_permissions(&cli);
    }
    let config = build_runtime_config(&cli, TargetDisplayNames::from_env())?;
    run_slack_bridge(config).await
}

fn check_permissions(cli: &Cli) -> Result<()> {
    let store = PermissionStore::new(&cli.permissions_file);
    let table = store.load()?;
    println!(
        "permission file {} is valid: {} entries",
        cli.permissions_file.display(),
        table.len()
    );
    Ok(())
}

fn required_token(value: Option<&str>, flag: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => bail!("{flag} is required"),
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub(crate) fn build_runtime_config(
    cli: &Cli,
    target_names: TargetDisplayNames,
) -> Result<SlackBridgeRuntimeConfig> {
    let app_token = required_token(cli.slack_app_token.as_deref(), "--slack-app-token")?;
    let bot_token = required_token(cli.slack_bot_token.as_deref(), "--slack-bot-token")?;

    let scripts_dir = cli.scripts_dir.clone();
    let metadata = std::fs::metadata(&scripts_dir)
        .with_context(|| format!("failed to read scripts dir {}", scripts_dir.display()))?;
    if !metadata.is_dir() {
        bail!("scripts dir {} is not a directory", scripts_dir.display());
    }

    let static_override = StaticOverride::from_specs(&cli.static_admin_ids, &cli.static_grants)
        .context("invalid static override configuration")?;
    if static_override.is_empty() && cli.bootstrap_identity_id.is_none() {
        tracing::info!("no static overrides configured; access relies on the permission file");
    }

    let permission_store = Arc::new(PermissionStore::new(&cli.permissions_file));
    let report = permission_store.reload();
    if !report.applied {
        tracing::warn!(
            path = %cli.permissions_file.display(),
            reason_code = %report.reason_code,
            "starting with an empty permission table"
        );
    }

    let credstore_aliases = cli
        .credstore_aliases
        .iter()
        .filter_map(|alias| non_blank(alias))
        .collect::<Vec<_>>();
    let dispatcher = DispatcherConfig {
        interpreter: non_blank(&cli.script_interpreter).map(PathBuf::from),
        scripts_dir,
        credstore_aliases,
        target_names,
        max_reply_chars: cli.max_reply_chars,
        post_progress: cli.progress_messages,
    };
    let runner = ProcessRunner::new(ProcessRunnerConfig {
        benign_stderr_marker: non_blank(&cli.benign_stderr_marker),
        timeout_ms: cli.script_timeout_ms,
    });

    Ok(SlackBridgeRuntimeConfig {
        api_base: cli.slack_api_base.clone(),
        app_token,
        bot_token,
        bot_user_id: cli.slack_bot_user_id.clone(),
        request_timeout_ms: cli.slack_request_timeout_ms,
        reconnect_delay: Duration::from_millis(cli.slack_reconnect_delay_ms),
        retry_max_attempts: cli.slack_retry_max_attempts,
        retry_base_delay_ms: cli.slack_retry_base_delay_ms,
        permission_store,
        static_override,
        bootstrap_identity_id: cli.bootstrap_identity_id.clone(),
        runner,
        dispatcher,
        permissions_reload_interval: Duration::from_secs(cli.permissions_reload_interval_secs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["pulse-bot"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse cli")
    }

    #[test]
    fn functional_build_runtime_config_loads_permissions_and_overrides() {
        let temp = tempdir().expect("tempdir");
        let permissions = temp.path().join("permissions.json");
        std::fs::write(&permissions, r#"{"admin": ["ops@x.com"], "fra": ["a@x.com"]}"#)
            .expect("write permissions");
        let scripts = temp.path().to_string_lossy().into_owned();
        let permissions_arg = permissions.to_string_lossy().into_owned();
        let cli = parse(&[
            "--slack-app-token",
            "xapp-1",
            "--slack-bot-token",
            " xoxb-1 ",
            "--permissions-file",
            permissions_arg.as_str(),
            "--scripts-dir",
            scripts.as_str(),
            "--static-admin-id",
            "U0",
            "--script-interpreter",
            "",
            "--benign-stderr-marker",
            "",
            "--credstore-alias",
            "ggadmin, ,ggreplica",
        ]);

        let config = build_runtime_config(&cli, TargetDisplayNames::default()).expect("config");
        assert_eq!(config.bot_token, "xoxb-1");
        assert!(config.permission_store.current().grants("fra", "a@x.com"));
        assert!(config.static_override.is_admin("U0"));
        assert_eq!(config.dispatcher.interpreter, None);
        assert_eq!(config.dispatcher.credstore_aliases, vec!["ggadmin", "ggreplica"]);
        assert_eq!(config.runner.config().benign_stderr_marker, None);
        assert_eq!(config.permissions_reload_interval, Duration::from_secs(300));
    }

    #[test]
    fn regression_build_runtime_config_fails_fast_on_bad_startup_values() {
        let temp = tempdir().expect("tempdir");
        let scripts = temp.path().to_string_lossy().into_owned();

        let cli = parse(&["--scripts-dir", scripts.as_str()]);
        let error = build_runtime_config(&cli, TargetDisplayNames::default())
            .err()
            .expect("tokens");
        assert!(error.to_string().contains("--slack-app-token is required"));

        let missing = temp.path().join("missing").to_string_lossy().into_owned();
        let cli = parse(&[
            "--slack-app-token",
            "xapp-1",
            "--slack-bot-token",
            "xoxb-1",
            "--scripts-dir",
            missing.as_str(),
        ]);
        let error = build_runtime_config(&cli, TargetDisplayNames::default())
            .err()
            .expect("dir");
        assert!(error.to_string().contains("failed to read scripts dir"));

        let cli = parse(&[
            "--slack-app-token",
            "xapp-1",
            "--slack-bot-token",
            "xoxb-1",
            "--scripts-dir",
            scripts.as_str(),
            "--static-grant",
            "fra",
        ]);
        let error = build_runtime_config(&cli, TargetDisplayNames::default())
            .err()
            .expect("grant");
        assert!(format!("{error:#}").contains("expected <capability>=<user_id>"));
    }

    #[test]
    fn functional_missing_permission_file_starts_with_empty_table() {
        let temp = tempdir().expect("tempdir");
        let scripts = temp.path().to_string_lossy().into_owned();
        let missing = temp.path().join("none.json").to_string_lossy().into_owned();
        let cli = parse(&[
            "--slack-app-token",
            "xapp-1",
            "--slack-bot-token",
            "xoxb-1",
            "--scripts-dir",
            scripts.as_str(),
            "--permissions-file",
            missing.as_str(),
        ]);
        let config = build_runtime_config(&cli, TargetDisplayNames::default()).expect("config");
        assert!(config.permission_store.current().is_empty());
        assert_eq!(
            config.dispatcher.interpreter,
            Some(PathBuf::from("python3"))
        );
    }

    #[test]
    fn regression_check_permissions_reports_malformed_file() {
        let temp = tempdir().expect("tempdir");
        let permissions = temp.path().join("permissions.json");
        std::fs::write(&permissions, r#"{"fra": "a@x.com"}"#).expect("write permissions");
        let permissions_arg = permissions.to_string_lossy().into_owned();
        let cli = parse(&["--check-permissions", "--permissions-file", permissions_arg.as_str()]);
        let error = check_permissions(&cli).expect_err("malformed");
        assert!(error.to_string().contains("malformed permission file"));
    }
}
