//! Chat reply formatting.

use pulse_access::PermissionReloadReport;
use pulse_runner::ScriptOutcome;

use crate::Capability;

pub const ALERT_MARKER: &str = ":warning:";
/// Shown for every denial; names no table key, email or reason code.
pub const DENIAL_MESSAGE: &str = ":warning: You are not authorized to run this command.";
pub const DEFAULT_MAX_REPLY_CHARS: usize = 38_000;

/// Commands a requester may run, as shown by help and mentions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelpListing {
    pub commands: Vec<Capability>,
    pub admin: bool,
}

pub fn truncate_for_display(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    truncated.push_str("\n... (truncated)");
    truncated
}

/// Breaks up backtick runs so script output cannot close the surrounding
/// code block. A zero-width space goes between adjacent backticks.
pub fn escape_code_fences(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let mut previous = None;
    for ch in value.chars() {
        if ch == '`' && previous == Some('`') {
            escaped.push('\u{200B}');
        }
        escaped.push(ch);
        previous = Some(ch);
    }
    escaped
}

pub fn render_script_outcome(
    capability: Capability,
    target: &str,
    outcome: &ScriptOutcome,
    max_chars: usize,
) -> String {
    let body = outcome.output.trim_end();
    let body = if body.trim().is_empty() {
        "(no output)".to_string()
    } else {
        escape_code_fences(&truncate_for_display(body, max_chars))
    };
    if outcome.succeeded {
        format!("*{}* on {target}\n```\n{body}\n```", capability.command_name())
    } else {
        format!(
            "{ALERT_MARKER} `{}` failed on {target}:\n```\n{body}\n```",
            capability.command_name()
        )
    }
}

pub fn render_usage_hint(message: &str) -> String {
    format!("{ALERT_MARKER} {message}")
}

pub fn render_unknown_command(command: &str) -> String {
    format!("{ALERT_MARKER} Unknown command `{}`.", command.trim())
}

pub fn render_help(listing: &HelpListing) -> String {
    if listing.commands.is_empty() && !listing.admin {
        return "You do not have access to any Pulse commands. Ask a Pulse admin to add your \
                email to the permission file."
            .to_string();
    }
    let mut lines = Vec::new();
    if !listing.commands.is_empty() {
        lines.push("Pulse commands available to you:".to_string());
        for capability in &listing.commands {
            lines.push(format!("- `{}`: {}", capability.usage(), capability.summary()));
        }
    }
    lines.push("- `/pulse whoami`: show the identity Pulse resolves for you".to_string());
    if listing.admin {
        lines.push(String::new());
        lines.push("Admin:".to_string());
        lines.push("- `/pulse reload`: reload the permission file".to_string());
        lines.push("- mention Pulse: reload the permission file and show this help".to_string());
    }
    lines.join("\n")
}

pub fn render_reload_report(report: &PermissionReloadReport) -> String {
    if report.applied {
        return format!(
            "Permission table reloaded ({} entries, reason_code={}).",
            report.entries, report.reason_code
        );
    }
    let mut text = format!(
        "{ALERT_MARKER} Permission reload failed (reason_code={}); keeping the previous table \
         with {} entries.",
        report.reason_code, report.entries
    );
    for diagnostic in &report.diagnostics {
        text.push_str(&format!("\n- {diagnostic}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_script_outcome_success_is_code_block_and_failure_has_alert() {
        let success = render_script_outcome(
            Capability::Tablespace,
            "ORCLPRD",
            &ScriptOutcome::success("USERS 91%\n"),
            100,
        );
        assert_eq!(success, "*/tablespace* on ORCLPRD\n```\nUSERS 91%\n```");

        let failure = render_script_outcome(
            Capability::Fra,
            "DB2",
            &ScriptOutcome::failure("ORA-01017"),
            100,
        );
        assert!(failure.starts_with(ALERT_MARKER));
        assert!(failure.contains("`/fra` failed on DB2"));
        assert!(failure.contains("```\nORA-01017\n```"));
    }

    #[test]
    fn unit_truncation_keeps_code_block_closed() {
        let long = "x".repeat(50);
        let rendered = render_script_outcome(
            Capability::Fra,
            "DB1",
            &ScriptOutcome::success(long),
            10,
        );
        assert!(rendered.contains("xxxxxxxxxx\n... (truncated)"));
        assert!(rendered.ends_with("\n```"));
        let empty =
            render_script_outcome(Capability::Fra, "DB1", &ScriptOutcome::success(" \n"), 10);
        assert!(empty.contains("(no output)"));
    }

    #[test]
    fn regression_script_output_with_backtick_fence_stays_inside_code_block() {
        let rendered = render_script_outcome(
            Capability::GoldenGate,
            "GG1",
            &ScriptOutcome::success("lag ok\n```\n*injected* `````\n"),
            100,
        );
        let body = rendered
            .strip_prefix("*/gg-status* on GG1\n```\n")
            .and_then(|rest| rest.strip_suffix("\n```"))
            .expect("single code block");
        assert!(!body.contains("``"));
        assert_eq!(body.replace('\u{200B}', ""), "lag ok\n```\n*injected* `````");
        assert_eq!(rendered.matches("```").count(), 2);
        assert_eq!(escape_code_fences("a`b"), "a`b");
    }

    #[test]
    fn unit_help_lists_only_granted_commands_and_admin_section() {
        let text = render_help(&HelpListing {
            commands: vec![Capability::Fra],
            admin: false,
        });
        assert!(text.contains("/fra [db1|db2]"));
        assert!(!text.contains("/tablespace"));
        assert!(!text.contains("/pulse reload"));

        let text = render_help(&HelpListing {
            commands: Vec::new(),
            admin: true,
        });
        assert!(text.contains("Admin:"));
        assert!(text.contains("/pulse reload"));

        let text = render_help(&HelpListing::default());
        assert!(text.starts_with("You do not have access"));
    }

    #[test]
    fn unit_reload_report_rendering_includes_diagnostics_on_failure() {
        let text = render_reload_report(&PermissionReloadReport {
            applied: false,
            reason_code: "permission_reload_malformed".to_string(),
            entries: 3,
            diagnostics: vec!["malformed permission file p.json: eof".to_string()],
        });
        assert!(text.starts_with(ALERT_MARKER));
        assert!(text.contains("3 entries"));
        assert!(text.contains("- malformed permission file p.json: eof"));
    }
}
