//! Per-run host state: the capability modules one script may call, closed over the policies
//! loaded for this session and its cancellation token.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::capabilities::{
    CliCapability, ClipboardCapability, Console, FsCapability, NetCapability,
};
use crate::vars::RuntimeVariables;

/// Raised at a host-call checkpoint once the session has been interrupted.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("workflow interrupted")]
pub struct Interrupted;

/// Everything a running script can reach. Lives for exactly one `run_workflow` call.
pub struct SessionHost {
    pub id: String,
    pub identifier: String,
    pub vars: RuntimeVariables,
    pub console: Arc<dyn Console>,
    pub cli: CliCapability,
    pub fs: FsCapability,
    pub net: NetCapability,
    pub clipboard: ClipboardCapability,
    cancel: CancellationToken,
}

impl SessionHost {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        identifier: String,
        vars: RuntimeVariables,
        console: Arc<dyn Console>,
        cli: CliCapability,
        fs: FsCapability,
        net: NetCapability,
        clipboard: ClipboardCapability,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            identifier,
            vars,
            console,
            cli,
            fs,
            net,
            clipboard,
            cancel,
        }
    }

    /// Fails once the session token is cancelled. Called around every host function.
    pub fn checkpoint(&self) -> Result<(), Interrupted> {
        if self.cancel.is_cancelled() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
