//! `http` namespace. Requests run on the host tokio runtime and are raced against the session
//! token, so an interrupted workflow never waits on a slow server.

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::WorkingDir;
use crate::network::{format_bytes, DownloadProgress, HttpResponse, JsonResponse, NetworkClient};
use crate::policy;

pub const UNAVAILABLE: &str = "Network functionality not available";
const INTERRUPTED: &str = "request interrupted: workflow cancelled";
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Value handed back to the script by every `http.*` call.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum HttpResult {
    Response(HttpResponse),
    Json(JsonResponse),
    /// No usable network collaborator for this session.
    Unavailable { error: String },
}

impl HttpResult {
    pub fn error(&self) -> Option<&str> {
        match self {
            HttpResult::Response(r) => r.error.as_deref(),
            HttpResult::Json(r) => r.error.as_deref(),
            HttpResult::Unavailable { error } => Some(error),
        }
    }
}

#[derive(Clone)]
pub struct NetCapability {
    client: Option<Arc<NetworkClient>>,
    runtime: Handle,
    cancel: CancellationToken,
    cwd: WorkingDir,
}

impl NetCapability {
    pub fn new(
        client: Option<Arc<NetworkClient>>,
        runtime: Handle,
        cancel: CancellationToken,
        cwd: WorkingDir,
    ) -> Self {
        Self {
            client,
            runtime,
            cancel,
            cwd,
        }
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    pub fn get(&self, url: &str, headers: &HashMap<String, String>) -> HttpResult {
        let Some(client) = self.client.as_deref() else {
            return unavailable();
        };
        HttpResult::Response(
            self.block_on(client.get(url, headers))
                .unwrap_or_else(|| HttpResponse::failed(INTERRUPTED)),
        )
    }

    pub fn post(&self, url: &str, body: String, headers: &HashMap<String, String>) -> HttpResult {
        let Some(client) = self.client.as_deref() else {
            return unavailable();
        };
        HttpResult::Response(
            self.block_on(client.post(url, body, headers))
                .unwrap_or_else(|| HttpResponse::failed(INTERRUPTED)),
        )
    }

    pub fn get_json(&self, url: &str, headers: &HashMap<String, String>) -> HttpResult {
        let Some(client) = self.client.as_deref() else {
            return unavailable();
        };
        HttpResult::Json(
            self.block_on(client.get_json(url, headers))
                .unwrap_or_else(|| JsonResponse {
                    error: Some(INTERRUPTED.to_string()),
                    ..JsonResponse::default()
                }),
        )
    }

    /// Download into `output_path` (resolved against the session working directory).
    /// With `show_progress`, a progress line is redrawn on stderr.
    pub fn download_file(&self, url: &str, output_path: &str, show_progress: bool) -> HttpResult {
        let Some(client) = self.client.as_deref() else {
            return unavailable();
        };
        if let Err(e) = policy::path::check(output_path) {
            return HttpResult::Response(HttpResponse::failed(e.to_string()));
        }
        let dest = self.cwd.resolve(output_path);

        let mut last_draw: Option<Instant> = None;
        let mut draw = |p: DownloadProgress| {
            let now = Instant::now();
            let complete = p.total.is_some_and(|t| p.downloaded >= t);
            if !complete && last_draw.is_some_and(|t| now.duration_since(t) < PROGRESS_INTERVAL) {
                return;
            }
            last_draw = Some(now);
            let speed = format!("{}/s", format_bytes(p.bytes_per_sec as u64));
            let line = match (p.percentage(), p.total) {
                (Some(pct), Some(total)) => format!(
                    "\rDownloading... {}% ({}/{}) - {}",
                    pct,
                    format_bytes(p.downloaded),
                    format_bytes(total),
                    speed
                ),
                _ => format!("\rDownloading... {} - {}", format_bytes(p.downloaded), speed),
            };
            let mut err = std::io::stderr().lock();
            let _ = err.write_all(line.as_bytes());
            let _ = err.flush();
        };
        let progress = if show_progress {
            Some(&mut draw as &mut (dyn FnMut(DownloadProgress) + Send))
        } else {
            None
        };

        let response = self
            .block_on(client.download_file(url, &dest, progress))
            .unwrap_or_else(|| HttpResponse::failed(INTERRUPTED));
        if show_progress && response.error.is_none() {
            eprintln!();
        }
        HttpResult::Response(response)
    }

    /// Drive `fut` to completion unless the session is cancelled first.
    fn block_on<F: Future>(&self, fut: F) -> Option<F::Output> {
        let cancel = self.cancel.clone();
        self.runtime.block_on(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                out = fut => Some(out),
            }
        })
    }
}

fn unavailable() -> HttpResult {
    HttpResult::Unavailable {
        error: UNAVAILABLE.to_string(),
    }
}
