//! Execution engine: resolve a workflow, check its marker, and run it in a fresh interpreter.
//!
//! The interpreter is not `Send`, so each run gets a dedicated session thread. The awaiting
//! task acts as the watcher: on deadline or cancellation it cancels the session token (which
//! kills in-flight subprocesses, aborts in-flight requests and makes the next host call throw),
//! waits a bounded grace period for the script to unwind, then returns regardless.

pub mod error;
pub mod js;
pub mod session;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::assets::{AssetStore, EmbeddedAssets};
use crate::capabilities::{
    CliCapability, ClipboardCapability, Console, FsCapability, NetCapability, StdConsole,
    WorkingDir,
};
use crate::clipboard::{Clipboard, SystemClipboard};
use crate::config::{UserConfig, WorkflowDirectoryProvider};
use crate::network::NetworkClient;
use crate::policy::{CommandWhitelist, FilePolicies, PolicyProvider};
use crate::resolver::ScriptResolver;
use crate::tools::{ToolPathCache, ToolPathProvider};
use crate::vars::RuntimeVariables;

pub use error::{EngineError, FailureKind, InterruptReason};
pub use js::ScriptError;
pub use session::SessionHost;

/// How long an interrupted script gets to unwind before the session thread is abandoned.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Workflow-level deadline. `None` runs until completion or cancellation.
    pub timeout: Option<Duration>,
    /// Cancelling this interrupts the run.
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Runs workflow scripts. Holds only collaborators; no state is shared between runs.
pub struct Engine {
    resolver: ScriptResolver,
    policies: Arc<dyn PolicyProvider>,
    tools: Option<Arc<dyn ToolPathProvider>>,
    clipboard: Arc<dyn Clipboard>,
    console: Arc<dyn Console>,
    grace: Duration,
}

pub struct EngineBuilder {
    dirs: Arc<dyn WorkflowDirectoryProvider>,
    policies: Arc<dyn PolicyProvider>,
    assets: Option<Arc<dyn AssetStore>>,
    tools: Option<Arc<dyn ToolPathProvider>>,
    clipboard: Arc<dyn Clipboard>,
    console: Arc<dyn Console>,
    grace: Duration,
}

impl EngineBuilder {
    /// Asset store for the last resolution tier. Defaults to the bundled workflows.
    pub fn assets(mut self, assets: Option<Arc<dyn AssetStore>>) -> Self {
        self.assets = assets;
        self
    }

    pub fn tools(mut self, tools: Arc<dyn ToolPathProvider>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.clipboard = clipboard;
        self
    }

    pub fn console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = console;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            resolver: ScriptResolver::new(self.dirs, self.assets),
            policies: self.policies,
            tools: self.tools,
            clipboard: self.clipboard,
            console: self.console,
            grace: self.grace,
        }
    }
}

enum Watch {
    Finished(Result<Result<(), ScriptError>, oneshot::error::RecvError>),
    Interrupt(InterruptReason),
}

impl Engine {
    pub fn builder(
        dirs: Arc<dyn WorkflowDirectoryProvider>,
        policies: Arc<dyn PolicyProvider>,
    ) -> EngineBuilder {
        EngineBuilder {
            dirs,
            policies,
            assets: Some(Arc::new(EmbeddedAssets)),
            tools: None,
            clipboard: Arc::new(SystemClipboard),
            console: Arc::new(StdConsole),
            grace: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Engine over the per-user base directory: permission files read per session, the tool
    /// path cache read once, the bundled workflows as the last tier.
    pub fn from_user_config(config: &UserConfig) -> Engine {
        let paths = config.paths.clone();
        let mut builder = Self::builder(
            Arc::new(config.clone()),
            Arc::new(FilePolicies::new(paths.clone())),
        );
        match ToolPathCache::load(&paths.tool_cache()) {
            Ok(cache) => builder = builder.tools(Arc::new(cache)),
            Err(e) => log::warn!("ignoring tool path cache: {:#}", e),
        }
        builder.build()
    }

    pub fn resolver(&self) -> &ScriptResolver {
        &self.resolver
    }

    /// Resolve, validate and execute `identifier` with `vars`.
    ///
    /// Must be called from within a tokio runtime; host calls that need async I/O are driven on
    /// it from the session thread.
    pub async fn run_workflow(
        &self,
        identifier: &str,
        vars: RuntimeVariables,
        options: RunOptions,
    ) -> Result<(), EngineError> {
        let source = self.resolver.resolve(identifier)?;
        if !source.has_marker() {
            return Err(EngineError::InvalidWorkflow {
                identifier: identifier.to_string(),
            });
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        log::info!(
            "session {} start: {} ({})",
            session_id,
            identifier,
            source.tier
        );

        let cancel = options.cancel.child_token();
        // Nothing started by this session outlives the call.
        let _guard = cancel.clone().drop_guard();
        let host = Arc::new(self.open_session(&session_id, identifier, vars, cancel.clone()));

        let (tx, mut rx) = oneshot::channel();
        let text = source.text;
        std::thread::Builder::new()
            .name(format!("amo-session-{}", &session_id[..8]))
            .spawn(move || {
                let _ = tx.send(js::evaluate(host, &text));
            })
            .map_err(|e| EngineError::Init(format!("failed to start session thread: {}", e)))?;

        let timeout = options.timeout;
        let deadline = async move {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let watched = tokio::select! {
            biased;
            res = &mut rx => Watch::Finished(res),
            _ = cancel.cancelled() => Watch::Interrupt(InterruptReason::Cancelled),
            _ = deadline => Watch::Interrupt(InterruptReason::Deadline(timeout.unwrap_or_default())),
        };

        let result = match watched {
            Watch::Finished(Ok(Ok(()))) => Ok(()),
            Watch::Finished(Ok(Err(ScriptError::Setup(message)))) => Err(EngineError::Init(message)),
            Watch::Finished(Ok(Err(ScriptError::Thrown(message)))) => {
                if cancel.is_cancelled() {
                    Err(self.interrupted(identifier, &options))
                } else {
                    Err(EngineError::Execution {
                        identifier: identifier.to_string(),
                        message,
                    })
                }
            }
            Watch::Finished(Err(_)) => Err(EngineError::Execution {
                identifier: identifier.to_string(),
                message: "session thread terminated unexpectedly".to_string(),
            }),
            Watch::Interrupt(reason) => {
                log::info!("session {} interrupted: {}", session_id, reason);
                cancel.cancel();
                if tokio::time::timeout(self.grace, &mut rx).await.is_err() {
                    log::warn!(
                        "session {} did not unwind within {:?}; abandoning interpreter thread",
                        session_id,
                        self.grace
                    );
                }
                Err(EngineError::Interrupted {
                    identifier: identifier.to_string(),
                    reason,
                })
            }
        };

        match &result {
            Ok(()) => log::info!(
                "session {} finished in {:.2}s",
                session_id,
                started.elapsed().as_secs_f64()
            ),
            Err(e) => log::info!("session {} failed: {}", session_id, e),
        }
        result
    }

    fn interrupted(&self, identifier: &str, options: &RunOptions) -> EngineError {
        let reason = if options.cancel.is_cancelled() {
            InterruptReason::Cancelled
        } else {
            InterruptReason::Deadline(options.timeout.unwrap_or_default())
        };
        EngineError::Interrupted {
            identifier: identifier.to_string(),
            reason,
        }
    }

    /// Load this session's policies and wire the capability modules.
    fn open_session(
        &self,
        session_id: &str,
        identifier: &str,
        vars: RuntimeVariables,
        cancel: CancellationToken,
    ) -> SessionHost {
        let whitelist = match self.policies.command_whitelist() {
            Ok(w) => w,
            Err(e) => {
                log::warn!("command whitelist unavailable, denying all commands: {:#}", e);
                CommandWhitelist::default()
            }
        };
        let client = match self
            .policies
            .network_allowlist()
            .and_then(NetworkClient::new)
        {
            Ok(c) => Some(Arc::new(c)),
            Err(e) => {
                log::warn!("network functionality not available: {:#}", e);
                None
            }
        };

        let runtime = Handle::current();
        let cwd = WorkingDir::from_process();
        SessionHost::new(
            session_id.to_string(),
            identifier.to_string(),
            vars,
            Arc::clone(&self.console),
            CliCapability::new(
                Arc::new(whitelist),
                self.tools.clone(),
                runtime.clone(),
                cancel.clone(),
                cwd.clone(),
            ),
            FsCapability::new(cwd.clone()),
            NetCapability::new(client, runtime, cancel.clone(), cwd),
            ClipboardCapability::new(Arc::clone(&self.clipboard)),
            cancel,
        )
    }
}
