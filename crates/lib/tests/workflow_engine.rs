//! Integration tests: run workflows end to end through the engine with in-memory policies,
//! console and clipboard. Nothing here touches the real clipboard or the user's base directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use amo::capabilities::{Console, MemoryConsole};
use amo::clipboard::MemoryClipboard;
use amo::config::{Config, Paths, UserConfig};
use amo::policy::{CommandWhitelist, NetworkAllowList, PolicyProvider, StaticPolicies};
use amo::{Engine, EngineError, RunOptions, RuntimeVariables};

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("amo-{}-{}", tag, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn engine_with(
    policies: Arc<dyn PolicyProvider>,
    console: &Arc<MemoryConsole>,
    clipboard: Arc<MemoryClipboard>,
) -> Engine {
    let base = temp_dir("engine-home");
    let dirs = Arc::new(UserConfig::new(Paths::new(base), Config::default(), None));
    Engine::builder(dirs, policies)
        .console(Arc::clone(console) as Arc<dyn Console>)
        .clipboard(clipboard)
        .build()
}

fn engine(commands: &[&str], hosts: &[&str], console: &Arc<MemoryConsole>) -> Engine {
    let policies = StaticPolicies::new(
        CommandWhitelist::new(commands.iter().copied()),
        NetworkAllowList::new(hosts.iter().copied()),
    );
    engine_with(
        Arc::new(policies),
        console,
        Arc::new(MemoryClipboard::default()),
    )
}

/// Write a marked script and return its absolute path as the run identifier.
fn script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("//!amo\n{}", body)).expect("write script");
    path.to_string_lossy().into_owned()
}

/// A JS string literal for `s`.
fn js(s: impl AsRef<str>) -> String {
    serde_json::to_string(s.as_ref()).expect("quote")
}

fn vars(pairs: &[(&str, &str)]) -> RuntimeVariables {
    pairs.iter().copied().collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn bundled_hello_greets_default_and_named() {
    let console = Arc::new(MemoryConsole::default());
    let engine = engine(&[], &[], &console);

    engine
        .run_workflow("hello", vars(&[]), RunOptions::default())
        .await
        .expect("hello runs");
    engine
        .run_workflow("hello.js", vars(&[("name", "amo")]), RunOptions::default())
        .await
        .expect("hello runs with name");

    assert_eq!(console.stdout(), ["Hello, world!", "Hello, amo!"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn help_variable_reaches_the_script() {
    let console = Arc::new(MemoryConsole::default());
    let engine = engine(&[], &[], &console);

    engine
        .run_workflow("hello", vars(&[("help", "true")]), RunOptions::default())
        .await
        .expect("hello help runs");

    assert_eq!(
        console.stdout().first().map(String::as_str),
        Some("hello.js: print a greeting")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unmarked_script_is_rejected_before_running() {
    let dir = temp_dir("engine-marker");
    let side_effect = dir.join("side.txt");
    let path = dir.join("plain.js");
    std::fs::write(
        &path,
        format!(
            "console.log('ran');\nfs.write({}, 'x');\n",
            js(side_effect.to_string_lossy())
        ),
    )
    .expect("write script");

    let console = Arc::new(MemoryConsole::default());
    let engine = engine(&[], &[], &console);
    let err = engine
        .run_workflow(&path.to_string_lossy(), vars(&[]), RunOptions::default())
        .await
        .expect_err("unmarked script must not run");

    assert!(matches!(err, EngineError::InvalidWorkflow { .. }), "{}", err);
    assert!(err.to_string().contains("must start with //!amo"));
    assert!(console.lines().is_empty());
    assert!(!side_effect.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_identifier_is_not_found() {
    let console = Arc::new(MemoryConsole::default());
    let engine = engine(&[], &[], &console);
    let err = engine
        .run_workflow("no-such-workflow", vars(&[]), RunOptions::default())
        .await
        .expect_err("missing workflow");
    assert!(matches!(err, EngineError::NotFound { .. }), "{}", err);
}

#[tokio::test(flavor = "multi_thread")]
async fn uncaught_exception_is_an_execution_failure() {
    let dir = temp_dir("engine-throw");
    let id = script(
        &dir,
        "throws.js",
        "console.log('before');\nthrow new Error('boom');\n",
    );

    let console = Arc::new(MemoryConsole::default());
    let engine = engine(&[], &[], &console);
    let err = engine
        .run_workflow(&id, vars(&[]), RunOptions::default())
        .await
        .expect_err("script throws");

    match &err {
        EngineError::Execution { message, .. } => assert!(message.contains("boom"), "{}", message),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(console.stdout(), ["before"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn denied_capabilities_come_back_as_data() {
    let dir = temp_dir("engine-denied");
    let id = script(
        &dir,
        "denied.js",
        r#"
var r = cliCommand("echo", ["hi"], {});
console.log(r.error);
var h = http.get("https://example.com/");
console.log(h.error);
var f = fs.read("../secret.txt");
console.log(String(f.success) + " " + f.error);
console.log(String(fs.exists("../secret.txt")));
console.log("done");
"#,
    );

    let console = Arc::new(MemoryConsole::default());
    let engine = engine(&[], &[], &console);
    engine
        .run_workflow(&id, vars(&[]), RunOptions::default())
        .await
        .expect("denials do not abort the script");

    let out = console.stdout();
    assert_eq!(out.len(), 5, "{:?}", out);
    assert!(out[0].contains("is not in the allowed CLI commands list"), "{}", out[0]);
    assert!(out[1].contains("URL not in allowed hosts whitelist"), "{}", out[1]);
    assert!(out[2].starts_with("false path traversal not allowed"), "{}", out[2]);
    assert_eq!(out[3], "false");
    assert_eq!(out[4], "done");
}

struct BrokenNetwork;

impl PolicyProvider for BrokenNetwork {
    fn command_whitelist(&self) -> anyhow::Result<CommandWhitelist> {
        Ok(CommandWhitelist::default())
    }

    fn network_allowlist(&self) -> anyhow::Result<NetworkAllowList> {
        anyhow::bail!("allow-list unreadable")
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unreadable_allowlist_leaves_network_unavailable() {
    let dir = temp_dir("engine-stub");
    let id = script(
        &dir,
        "stub.js",
        r#"
console.log(http.get("https://example.com/").error);
console.log(http.getJSON("https://example.com/").error);
console.log(http.downloadFile("https://example.com/a", "a.bin").error);
"#,
    );

    let console = Arc::new(MemoryConsole::default());
    let engine = engine_with(
        Arc::new(BrokenNetwork),
        &console,
        Arc::new(MemoryClipboard::default()),
    );
    engine
        .run_workflow(&id, vars(&[]), RunOptions::default())
        .await
        .expect("stub run");

    assert_eq!(
        console.stdout(),
        [
            "Network functionality not available",
            "Network functionality not available",
            "Network functionality not available",
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn file_operations_use_a_session_local_directory() {
    let dir = temp_dir("engine-fs");
    let work = dir.join("work");
    let id = script(
        &dir,
        "files.js",
        &format!(
            r#"
console.log(String(fs.mkdir({work}).success));
console.log(String(fs.chdir({work}).success));
fs.write("notes.txt", "one\n");
fs.append("notes.txt", "two\n");
console.log(fs.read("notes.txt").content.trim());
console.log(fs.cwd().path);
console.log(fs.join("a", "b", "c.txt"));
console.log(fs.ext("archive.tar.gz"));
"#,
            work = js(work.to_string_lossy())
        ),
    );

    let before = std::env::current_dir().expect("process cwd");
    let console = Arc::new(MemoryConsole::default());
    let engine = engine(&[], &[], &console);
    engine
        .run_workflow(&id, vars(&[]), RunOptions::default())
        .await
        .expect("fs run");

    let out = console.stdout();
    assert_eq!(out[0], "true");
    assert_eq!(out[1], "true");
    assert_eq!(out[2], "one\ntwo");
    assert_eq!(out[3], work.to_string_lossy());
    assert_eq!(out[4], Path::new("a").join("b").join("c.txt").to_string_lossy());
    assert_eq!(out[5], ".gz");
    assert_eq!(
        std::fs::read_to_string(work.join("notes.txt")).expect("written"),
        "one\ntwo\n"
    );
    assert_eq!(std::env::current_dir().expect("process cwd"), before);
}

#[tokio::test(flavor = "multi_thread")]
async fn clipboard_and_encoding_round_trip() {
    let id = "clipboard-base64";
    let console = Arc::new(MemoryConsole::default());
    let clipboard = Arc::new(MemoryClipboard::with_text("hello amo"));
    let engine = engine_with(
        Arc::new(StaticPolicies::default()),
        &console,
        Arc::clone(&clipboard),
    );
    engine
        .run_workflow(id, vars(&[]), RunOptions::default())
        .await
        .expect("encode run");

    use amo::clipboard::Clipboard;
    assert_eq!(clipboard.read().expect("clipboard text"), "aGVsbG8gYW1v");

    engine
        .run_workflow(id, vars(&[("mode", "decode")]), RunOptions::default())
        .await
        .expect("decode run");
    assert_eq!(clipboard.read().expect("clipboard text"), "hello amo");
}

#[tokio::test(flavor = "multi_thread")]
async fn variables_are_not_shared_between_runs() {
    let dir = temp_dir("engine-vars");
    let id = script(
        &dir,
        "vars.js",
        r#"
if (typeof leaked !== "undefined") { console.log("leaked " + leaked); }
var leaked = getVar("name");
console.log("[" + getVar("name") + "]");
"#,
    );

    let console = Arc::new(MemoryConsole::default());
    let engine = engine(&[], &[], &console);
    engine
        .run_workflow(&id, vars(&[("name", "first")]), RunOptions::default())
        .await
        .expect("first run");
    engine
        .run_workflow(&id, vars(&[]), RunOptions::default())
        .await
        .expect("second run");

    assert_eq!(console.stdout(), ["[first]", "[]"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn interruption_is_not_swallowed_by_try_catch() {
    let dir = temp_dir("engine-catch");
    let id = script(
        &dir,
        "stubborn.js",
        r#"
console.log("start");
while (true) {
    try {
        getVar("who");
    } catch (e) {
        // keep going
    }
}
"#,
    );

    let console = Arc::new(MemoryConsole::default());
    let base = temp_dir("engine-home");
    let engine = Engine::builder(
        Arc::new(UserConfig::new(Paths::new(base), Config::default(), None)),
        Arc::new(StaticPolicies::default()),
    )
    .console(Arc::clone(&console) as Arc<dyn Console>)
    .clipboard(Arc::new(MemoryClipboard::default()))
    .grace_period(std::time::Duration::from_secs(30))
    .build();

    let started = std::time::Instant::now();
    let err = engine
        .run_workflow(
            &id,
            vars(&[("who", "amo")]),
            RunOptions::default().with_timeout(std::time::Duration::from_millis(300)),
        )
        .await
        .expect_err("deadline");

    assert!(err.is_timeout(), "{}", err);
    // The interpreter unwinds at its next host call instead of running out the grace period.
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    assert_eq!(console.stdout(), ["start"]);
}

#[cfg(unix)]
mod subprocess {
    use super::*;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    #[tokio::test(flavor = "multi_thread")]
    async fn whitelisted_command_runs_in_session_directory() {
        let dir = temp_dir("engine-cli");
        let id = script(
            &dir,
            "cli.js",
            &format!(
                r#"
var r = cliCommand("echo", ["hi", "there"], {{ timeout: 1e30 }});
console.log(r.stdout.trim());
fs.chdir({dir});
console.log(cliCommand("pwd", [], {{}}).stdout.trim());
"#,
                dir = js(dir.to_string_lossy())
            ),
        );

        let console = Arc::new(MemoryConsole::default());
        let engine = engine(&["echo", "pwd"], &[], &console);
        engine
            .run_workflow(&id, vars(&[]), RunOptions::default())
            .await
            .expect("cli run");

        let out = console.stdout();
        assert_eq!(out[0], "hi there");
        let reported = std::fs::canonicalize(&out[1]).expect("pwd output is a path");
        assert_eq!(reported, std::fs::canonicalize(&dir).expect("canonical dir"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn command_timeout_is_reported_to_the_script() {
        let dir = temp_dir("engine-cli-timeout");
        let id = script(
            &dir,
            "slow.js",
            r#"
var r = cliCommand("sleep", ["10"], { timeout: 1 });
console.log(r.error);
"#,
        );

        let console = Arc::new(MemoryConsole::default());
        let engine = engine(&["sleep"], &[], &console);
        let started = Instant::now();
        engine
            .run_workflow(
                &id,
                vars(&[]),
                RunOptions::default().with_timeout(Duration::from_secs(20)),
            )
            .await
            .expect("timeout is data, not a failure");

        assert!(started.elapsed() < Duration::from_secs(8));
        assert_eq!(console.stdout(), ["command timed out after 1 seconds"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deadline_interrupts_a_running_command() {
        let dir = temp_dir("engine-deadline");
        let id = script(
            &dir,
            "long.js",
            r#"
console.log("start");
cliCommand("sleep", ["30"], {});
console.log("after");
"#,
        );

        let console = Arc::new(MemoryConsole::default());
        let engine = engine(&["sleep"], &[], &console);
        let started = Instant::now();
        let err = engine
            .run_workflow(
                &id,
                vars(&[]),
                RunOptions::default().with_timeout(Duration::from_millis(500)),
            )
            .await
            .expect_err("deadline");

        assert!(err.is_timeout(), "{}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(console.stdout(), ["start"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancellation_interrupts_the_run() {
        let dir = temp_dir("engine-cancel");
        let id = script(&dir, "long.js", "cliCommand(\"sleep\", [\"30\"], {});\n");

        let console = Arc::new(MemoryConsole::default());
        let engine = engine(&["sleep"], &[], &console);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = engine
            .run_workflow(&id, vars(&[]), RunOptions::default().with_cancel(cancel))
            .await
            .expect_err("cancelled");

        match &err {
            EngineError::Interrupted { reason, .. } => {
                assert_eq!(*reason, amo::engine::InterruptReason::Cancelled)
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.is_timeout(), "{}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
