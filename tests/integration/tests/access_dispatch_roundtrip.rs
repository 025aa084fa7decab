use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use pulse_access::{
    AccessController, IdentityDirectory, IdentityResolver, LookupError, PermissionStore, Profile,
    StaticOverride,
};
use pulse_dispatch::{
    CommandDispatcher, CommandInvocation, DispatchStatus, DispatcherConfig, NoopProgressSink,
    TargetDisplayNames, DENIAL_MESSAGE,
};
use pulse_runner::{ProcessRunner, ProcessRunnerConfig};
use serde_json::json;
use tempfile::TempDir;

/// Directory whose availability can be toggled mid-test and that counts lookups.
struct SwitchableDirectory {
    emails: BTreeMap<String, String>,
    reachable: AtomicBool,
    lookups: AtomicUsize,
}

impl SwitchableDirectory {
    fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            emails: entries
                .iter()
                .map(|(id, email)| (id.to_string(), email.to_string()))
                .collect(),
            reachable: AtomicBool::new(true),
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl IdentityDirectory for SwitchableDirectory {
    async fn get_profile(&self, id: &str) -> Result<Profile, LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(LookupError::Unreachable("directory offline".to_string()));
        }
        let email = self
            .emails
            .get(id)
            .ok_or_else(|| LookupError::NotFound(id.to_string()))?;
        Ok(Profile {
            display_name: id.to_string(),
            email: Some(email.clone()),
        })
    }
}

struct Harness {
    workspace: TempDir,
    store: Arc<PermissionStore>,
    directory: Arc<SwitchableDirectory>,
    dispatcher: CommandDispatcher,
}

impl Harness {
    fn new(script_body: &str, overrides: StaticOverride) -> Self {
        let workspace = tempfile::tempdir().expect("tempdir");
        let scripts = workspace.path().join("scripts");
        fs::create_dir_all(&scripts).expect("scripts dir");
        for name in ["tablespace.py", "fra.py", "gg_status.py"] {
            fs::write(scripts.join(name), script_body).expect("write script");
        }

        let store = Arc::new(PermissionStore::new(workspace.path().join("permissions.json")));
        let directory = Arc::new(SwitchableDirectory::new(&[
            ("U1", "dba@example.com"),
            ("U2", "dev@example.com"),
            ("U3", "ops@example.com"),
        ]));
        let access = AccessController::new(
            Arc::clone(&store),
            IdentityResolver::new(directory.clone()),
            overrides,
        );

        // Scripts are plain shell; running them through `sh` mirrors the
        // interpreter + script path command line used with python3.
        let mut config = DispatcherConfig::new(&scripts);
        config.interpreter = Some(PathBuf::from("/bin/sh"));
        config.credstore_aliases = vec!["ggadmin".to_string()];
        config.target_names = TargetDisplayNames::from_lookup(|key| match key {
            "DB1_NAME" => Some("ORCLPRD".to_string()),
            "GG2_HOST" => Some("gg-west.example.com".to_string()),
            _ => None,
        });
        let dispatcher = CommandDispatcher::new(
            Arc::new(access),
            ProcessRunner::new(ProcessRunnerConfig::default()),
            config,
        );
        Self {
            workspace,
            store,
            directory,
            dispatcher,
        }
    }

    fn write_permissions(&self, payload: serde_json::Value) {
        write_json(self.store.path(), &payload);
    }

    fn scripts_dir(&self) -> PathBuf {
        self.workspace.path().join("scripts")
    }

    async fn run(&self, command: &str, text: &str, requester: &str) -> (DispatchStatus, String) {
        let reply = self
            .dispatcher
            .dispatch(
                &CommandInvocation {
                    capability: command.to_string(),
                    raw_argument_text: text.to_string(),
                    requester_id: requester.to_string(),
                },
                &NoopProgressSink,
            )
            .await;
        (reply.status, reply.text)
    }
}

fn write_json(path: &Path, payload: &serde_json::Value) {
    fs::write(path, format!("{payload}\n")).expect("write json");
}

#[tokio::test]
async fn integration_permission_edits_take_effect_after_reload() {
    let harness = Harness::new("echo \"$(basename \"$0\") $*\"\n", StaticOverride::new());
    harness.write_permissions(json!({
        "admin": ["ops@example.com"],
        "tablespace": ["dba@example.com"],
    }));
    assert!(harness.dispatcher.reload_permissions().await.applied);

    let (status, text) = harness.run("/tablespace", "", "U1").await;
    assert_eq!(status, DispatchStatus::Succeeded);
    assert!(text.starts_with("*/tablespace* on ORCLPRD"));
    assert!(text.contains("tablespace.py --db db1"));

    let (status, _) = harness.run("/tablespace", "", "U2").await;
    assert_eq!(status, DispatchStatus::Denied);

    harness.write_permissions(json!({
        "admin": ["ops@example.com"],
        "TableSpace": ["DEV@example.com"],
    }));
    let (status, text) = harness.run("/pulse", "reload", "U3").await;
    assert_eq!(status, DispatchStatus::Informational);
    assert!(text.contains("permission_reload_applied"));

    let (status, _) = harness.run("/tablespace", "db2", "U2").await;
    assert_eq!(status, DispatchStatus::Succeeded);
    let (_, text) = harness.run("/tablespace", "", "U1").await;
    assert_eq!(text, DENIAL_MESSAGE);
}

#[tokio::test]
async fn integration_static_admin_survives_directory_outage_and_bad_reload() {
    let harness = Harness::new(
        "echo ok\n",
        StaticOverride::new().grant_admin("UOPS").grant("goldengate", "UOPS"),
    );
    harness.write_permissions(json!({"goldengate": ["dba@example.com"]}));
    harness.dispatcher.reload_permissions().await;
    harness.directory.reachable.store(false, Ordering::SeqCst);

    let (status, _) = harness.run("/gg-status", "gg2 lag ggadmin", "UOPS").await;
    assert_eq!(status, DispatchStatus::Succeeded);
    let (status, text) = harness.run("/gg-status", "", "U1").await;
    assert_eq!(status, DispatchStatus::Denied);
    assert_eq!(text, DENIAL_MESSAGE);

    fs::write(harness.store.path(), "{\"goldengate\": [1]}").expect("corrupt permissions");
    let (status, text) = harness.run("/pulse", "reload", "UOPS").await;
    assert_eq!(status, DispatchStatus::Failed);
    assert!(text.contains("permission_reload_malformed"));

    harness.directory.reachable.store(true, Ordering::SeqCst);
    let (status, _) = harness.run("/gg-status", "credstore", "U1").await;
    assert_eq!(status, DispatchStatus::Succeeded);
}

#[tokio::test]
async fn integration_free_text_never_reaches_script_arguments() {
    let harness = Harness::new(
        "for arg in \"$@\"; do echo \"[$arg]\"; done\n",
        StaticOverride::new().grant("fra", "U9").grant("goldengate", "U9"),
    );

    let (_, text) = harness.run("/fra", "db2 && touch /tmp/pwned", "U9").await;
    assert!(text.contains("[--db]\n[db2]"));
    assert!(!text.contains("pwned"));

    let (_, text) = harness
        .run("/gg-status", "GG2 lag ggadmin'; id #", "U9")
        .await;
    assert!(text.contains("allowed aliases: ggadmin"));

    let (_, text) = harness.run("/gg-status", "gg2 lag ggadmin", "U9").await;
    assert!(text.contains("*/gg-status* on gg-west.example.com"));
    assert!(text.contains("[--credstore]\n[ggadmin]"));
    assert_eq!(harness.directory.lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn integration_script_stderr_and_benign_warning_classification() {
    let harness = Harness::new(
        "echo ok\n",
        StaticOverride::new().grant("fra", "U9").grant("tablespace", "U9"),
    );
    fs::write(
        harness.scripts_dir().join("fra.py"),
        "echo 'CryptographyDeprecationWarning: old python' >&2\necho 'FRA 42%'\n",
    )
    .expect("write fra");
    fs::write(
        harness.scripts_dir().join("tablespace.py"),
        "echo 'cx_Oracle.DatabaseError: ORA-01017' >&2\n",
    )
    .expect("write tablespace");

    let (status, text) = harness.run("/fra", "", "U9").await;
    assert_eq!(status, DispatchStatus::Succeeded);
    assert!(text.contains("FRA 42%"));

    let (status, text) = harness.run("/tablespace", "", "U9").await;
    assert_eq!(status, DispatchStatus::Failed);
    assert!(text.starts_with(":warning:"));
    assert!(text.contains("ORA-01017"));
}

#[tokio::test]
async fn regression_error_printed_beside_benign_warning_fails_the_run() {
    let harness = Harness::new(
        "echo 'CryptographyDeprecationWarning: old python' >&2\n\
         echo 'ORA-12541: TNS:no listener' >&2\n\
         echo 'TABLESPACE USAGE REPORT'\n",
        StaticOverride::new().grant("tablespace", "U9"),
    );

    let (status, text) = harness.run("/tablespace", "db2", "U9").await;
    assert_eq!(status, DispatchStatus::Failed);
    assert!(text.starts_with(":warning:"));
    assert!(text.contains("ORA-12541"));
    assert!(!text.contains("TABLESPACE USAGE REPORT"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn integration_concurrent_commands_run_independently() {
    let harness = Arc::new(Harness::new(
        "sleep 0.3\necho \"done $*\"\n",
        StaticOverride::new().grant("tablespace", "U9").grant("fra", "U9"),
    ));

    let started = Instant::now();
    let mut tasks = Vec::new();
    for (command, text) in [
        ("/tablespace", "db1"),
        ("/tablespace", "db2"),
        ("/fra", "db1"),
        ("/fra", "db2"),
    ] {
        let harness = Arc::clone(&harness);
        tasks.push(tokio::spawn(async move {
            let (status, reply) = harness.run(command, text, "U9").await;
            (status, reply, text)
        }));
    }
    for task in tasks {
        let (status, reply, text) = task.await.expect("join dispatch task");
        assert_eq!(status, DispatchStatus::Succeeded);
        assert!(reply.contains(&format!("done --db {text}")));
    }
    assert!(started.elapsed() < Duration::from_millis(1_100));
}
