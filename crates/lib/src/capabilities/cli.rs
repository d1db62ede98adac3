//! `cliCommand(name, args, options)`: run a whitelisted executable without a shell.
//!
//! Each call carries its own deadline, independent of the workflow deadline, and is also
//! bound to the session token so an interrupted workflow kills its child process.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::WorkingDir;
use crate::policy::commands::base_name;
use crate::policy::CommandWhitelist;
use crate::tools::ToolPathProvider;

/// Per-command deadline when the script does not pass `timeout`.
pub const DEFAULT_TIMEOUT_SECS: f64 = 3600.0;
/// Longest per-command deadline; larger requests are clamped to it.
pub const MAX_TIMEOUT_SECS: f64 = 365.0 * 24.0 * 3600.0;
const INTERRUPTED: &str = "command interrupted: workflow cancelled";

/// Options object accepted as the third `cliCommand` argument.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliOptions {
    /// Seconds; non-positive values fall back to the default, huge ones are clamped.
    pub timeout: Option<f64>,
    pub cwd: Option<String>,
    /// Merged onto the inherited environment. Non-string values are stringified.
    pub env: BTreeMap<String, serde_json::Value>,
    pub interactive: bool,
    /// Piped to the child. Ignored when `interactive`.
    pub stdin: Option<String>,
}

impl CliOptions {
    /// `null`/`undefined` mean no options.
    pub fn from_value(value: serde_json::Value) -> Result<Self, String> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|e| format!("invalid options: {}", e))
    }

    pub fn timeout_secs(&self) -> f64 {
        match self.timeout {
            Some(t) if t.is_finite() && t > 0.0 => t.min(MAX_TIMEOUT_SECS),
            _ => DEFAULT_TIMEOUT_SECS,
        }
    }

    fn env_pairs(&self) -> impl Iterator<Item = (&str, String)> {
        self.env.iter().filter_map(|(k, v)| match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((k.as_str(), s.clone())),
            other => Some((k.as_str(), other.to_string())),
        })
    }
}

/// `{stdout, stderr, error?}` as seen by the script.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CliResult {
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CliResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct CliCapability {
    whitelist: Arc<CommandWhitelist>,
    tools: Option<Arc<dyn ToolPathProvider>>,
    runtime: Handle,
    cancel: CancellationToken,
    cwd: WorkingDir,
}

impl CliCapability {
    pub fn new(
        whitelist: Arc<CommandWhitelist>,
        tools: Option<Arc<dyn ToolPathProvider>>,
        runtime: Handle,
        cancel: CancellationToken,
        cwd: WorkingDir,
    ) -> Self {
        Self {
            whitelist,
            tools,
            runtime,
            cancel,
            cwd,
        }
    }

    /// Blocks the calling (session) thread until the command exits, times out or is cancelled.
    pub fn run(&self, name: &str, args: &[String], options: &CliOptions) -> CliResult {
        if let Err(e) = self.whitelist.check(name) {
            log::warn!("denied cliCommand: {}", e);
            return CliResult::failed(e.to_string());
        }
        let program = self.resolve_program(name);
        log::debug!("cliCommand {} -> {} {:?}", name, program.display(), args);

        let mut cmd = Command::new(&program);
        cmd.args(args).kill_on_drop(true);
        let dir = match options.cwd.as_deref().filter(|c| !c.is_empty()) {
            Some(c) => self.cwd.resolve(c),
            None => self.cwd.get(),
        };
        cmd.current_dir(dir);
        for (k, v) in options.env_pairs() {
            cmd.env(k, v);
        }

        let stdin = if options.interactive {
            None
        } else {
            options.stdin.clone()
        };
        let timeout = options.timeout_secs();
        let cancel = self.cancel.clone();
        self.runtime.block_on(execute(
            cmd,
            options.interactive,
            stdin,
            timeout,
            cancel,
        ))
    }

    /// PATH first, then the tool path cache (only if the cached file still exists), else the
    /// literal name so the OS reports the failure.
    fn resolve_program(&self, name: &str) -> PathBuf {
        if let Ok(p) = which::which(name) {
            return p;
        }
        let cached = self
            .tools
            .as_ref()
            .and_then(|t| t.cached_tool_path(base_name(name)))
            .filter(|p| p.is_file());
        if let Some(p) = cached {
            log::debug!("using cached tool path for {}: {}", name, p.display());
            return p;
        }
        PathBuf::from(name)
    }
}

async fn execute(
    mut cmd: Command,
    interactive: bool,
    stdin: Option<String>,
    timeout_secs: f64,
    cancel: CancellationToken,
) -> CliResult {
    if interactive {
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
    } else {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
    }

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return CliResult::failed(format!("failed to start command: {}", e)),
    };
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        // Written from a task so a child that never reads cannot block us.
        tokio::spawn(async move {
            let _ = pipe.write_all(input.as_bytes()).await;
        });
    }

    // Dropping the wait future drops the child, and kill_on_drop reaps it.
    tokio::select! {
        out = child.wait_with_output() => match out {
            Ok(output) => {
                let mut result = CliResult {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    error: None,
                };
                if !output.status.success() {
                    result.error = Some(match output.status.code() {
                        Some(code) => format!("exit status {}", code),
                        None => output.status.to_string(),
                    });
                }
                result
            }
            Err(e) => CliResult::failed(format!("failed to wait for command: {}", e)),
        },
        _ = tokio::time::sleep(Duration::from_secs_f64(timeout_secs)) => {
            CliResult::failed(format!("command timed out after {} seconds", timeout_secs))
        }
        _ = cancel.cancelled() => CliResult::failed(INTERRUPTED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Instant;

    struct FixedTools(HashMap<String, PathBuf>);

    impl ToolPathProvider for FixedTools {
        fn cached_tool_path(&self, name: &str) -> Option<PathBuf> {
            self.0.get(name).cloned()
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    fn capability(rt: &tokio::runtime::Runtime, allowed: &[&str]) -> CliCapability {
        CliCapability::new(
            Arc::new(CommandWhitelist::new(allowed.iter().copied())),
            None,
            rt.handle().clone(),
            CancellationToken::new(),
            WorkingDir::from_process(),
        )
    }

    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn options_parse_with_defaults() {
        let opts = CliOptions::from_value(serde_json::Value::Null).unwrap();
        assert_eq!(opts.timeout_secs(), DEFAULT_TIMEOUT_SECS);
        assert!(!opts.interactive);

        let opts = CliOptions::from_value(serde_json::json!({
            "timeout": 2,
            "env": {"A": "1", "B": 2, "C": null},
            "stdin": "x"
        }))
        .unwrap();
        assert_eq!(opts.timeout_secs(), 2.0);
        let env: Vec<_> = opts.env_pairs().collect();
        assert_eq!(env, [("A", "1".to_string()), ("B", "2".to_string())]);

        let zero = CliOptions {
            timeout: Some(0.0),
            ..CliOptions::default()
        };
        assert_eq!(zero.timeout_secs(), DEFAULT_TIMEOUT_SECS);

        let huge = CliOptions::from_value(serde_json::json!({"timeout": 1e30})).unwrap();
        assert_eq!(huge.timeout_secs(), MAX_TIMEOUT_SECS);
        assert!(Duration::try_from_secs_f64(huge.timeout_secs()).is_ok());

        let err = CliOptions::from_value(serde_json::json!({"timeout": "soon"})).unwrap_err();
        assert!(err.starts_with("invalid options"));
    }

    #[test]
    fn non_whitelisted_command_is_not_executed() {
        let rt = runtime();
        let cap = capability(&rt, &[]);
        let res = cap.run("/bin/echo", &args(&["hi"]), &CliOptions::default());
        let err = res.error.unwrap();
        assert!(err.contains("'/bin/echo'"));
        assert!(err.contains("'echo'"));
        assert!(res.stdout.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout_and_stdin() {
        let rt = runtime();
        let cap = capability(&rt, &["echo", "cat"]);
        let res = cap.run("echo", &args(&["hello"]), &CliOptions::default());
        assert_eq!(res.stdout, "hello\n");
        assert!(res.error.is_none());

        let opts = CliOptions {
            stdin: Some("piped".into()),
            ..CliOptions::default()
        };
        let res = cap.run("cat", &[], &opts);
        assert_eq!(res.stdout, "piped");
    }

    #[cfg(unix)]
    #[test]
    fn huge_timeout_still_runs_the_command() {
        let rt = runtime();
        let cap = capability(&rt, &["echo"]);
        let opts = CliOptions {
            timeout: Some(1e30),
            ..CliOptions::default()
        };
        let res = cap.run("echo", &args(&["hi"]), &opts);
        assert_eq!(res.stdout, "hi\n");
        assert!(res.error.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_reported() {
        let rt = runtime();
        let cap = capability(&rt, &["sh"]);
        let res = cap.run("sh", &args(&["-c", "echo oops >&2; exit 3"]), &CliOptions::default());
        assert_eq!(res.stderr, "oops\n");
        assert_eq!(res.error.as_deref(), Some("exit status 3"));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_message_names_the_limit() {
        let rt = runtime();
        let cap = capability(&rt, &["sleep"]);
        let opts = CliOptions {
            timeout: Some(1.0),
            ..CliOptions::default()
        };
        let started = Instant::now();
        let res = cap.run("sleep", &args(&["30"]), &opts);
        assert_eq!(res.error.as_deref(), Some("command timed out after 1 seconds"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn cancellation_kills_the_child() {
        let rt = runtime();
        let cancel = CancellationToken::new();
        let cap = CliCapability::new(
            Arc::new(CommandWhitelist::new(["sleep"])),
            None,
            rt.handle().clone(),
            cancel.clone(),
            WorkingDir::from_process(),
        );
        let trigger = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            trigger.cancel();
        });
        let started = Instant::now();
        let res = cap.run("sleep", &args(&["30"]), &CliOptions::default());
        assert_eq!(res.error.as_deref(), Some(INTERRUPTED));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn cwd_defaults_to_session_directory() {
        let rt = runtime();
        let dir = std::env::temp_dir().join(format!("amo-cli-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("inner")).unwrap();
        let cap = CliCapability::new(
            Arc::new(CommandWhitelist::new(["pwd"])),
            None,
            rt.handle().clone(),
            CancellationToken::new(),
            WorkingDir::new(&dir),
        );
        let res = cap.run("pwd", &[], &CliOptions::default());
        assert_eq!(
            PathBuf::from(res.stdout.trim()).canonicalize().unwrap(),
            dir.canonicalize().unwrap()
        );
        let opts = CliOptions {
            cwd: Some("inner".into()),
            ..CliOptions::default()
        };
        let res = cap.run("pwd", &[], &opts);
        assert!(res.stdout.trim().ends_with("inner"));
    }

    #[test]
    fn cached_tool_path_is_second_choice() {
        let rt = runtime();
        let dir = std::env::temp_dir().join(format!("amo-tools-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let tool = dir.join("amo-fake-tool");
        std::fs::write(&tool, "").unwrap();
        let tools = FixedTools(HashMap::from([
            ("amo-fake-tool".to_string(), tool.clone()),
            ("amo-gone-tool".to_string(), dir.join("missing")),
        ]));
        let cap = CliCapability::new(
            Arc::new(CommandWhitelist::default()),
            Some(Arc::new(tools)),
            rt.handle().clone(),
            CancellationToken::new(),
            WorkingDir::from_process(),
        );
        assert_eq!(cap.resolve_program("amo-fake-tool"), tool);
        assert_eq!(
            cap.resolve_program("amo-gone-tool"),
            PathBuf::from("amo-gone-tool")
        );
    }
}
