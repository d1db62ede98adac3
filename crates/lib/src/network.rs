//! HTTP collaborator used by the sandbox's `http` namespace.
//!
//! Every request, and every redirect hop, must pass the network allow-list. Failures come back
//! as a response with `error` set rather than as `Err`, so the capability layer can hand them
//! straight to the script.

use futures_util::StreamExt;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

use crate::policy::NetworkAllowList;

pub const USER_AGENT: &str = "amo-cli/1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_REDIRECTS: usize = 10;

/// Response handed to scripts by `http.get`, `http.post` and `http.downloadFile`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HttpResponse {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Response handed to scripts by `http.getJSON`: parsed `data`, or `error` plus `raw_body`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JsonResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Download progress snapshot passed to the optional callback.
#[derive(Debug, Clone, Copy)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
    /// Bytes per second since the download started.
    pub bytes_per_sec: f64,
}

impl DownloadProgress {
    pub fn percentage(&self) -> Option<u8> {
        self.total
            .filter(|t| *t > 0)
            .map(|t| ((self.downloaded.min(t) * 100) / t) as u8)
    }
}

/// Allow-list-checked HTTP client.
#[derive(Clone)]
pub struct NetworkClient {
    client: reqwest::Client,
    allow: Arc<NetworkAllowList>,
}

impl NetworkClient {
    pub fn new(allow: NetworkAllowList) -> anyhow::Result<Self> {
        let allow = Arc::new(allow);
        let redirect_allow = Arc::clone(&allow);
        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error("too many redirects");
            }
            let url = attempt.url();
            if redirect_allow.allows(url.host_str().unwrap_or_default(), url.path()) {
                attempt.follow()
            } else {
                let msg = format!("redirect to {} is not in allowed hosts whitelist", url);
                attempt.error(msg)
            }
        });
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .redirect(redirect)
            .build()?;
        Ok(Self { client, allow })
    }

    pub fn allowlist(&self) -> &NetworkAllowList {
        &self.allow
    }

    pub async fn get(&self, url: &str, headers: &HashMap<String, String>) -> HttpResponse {
        self.request(reqwest::Method::GET, url, None, headers).await
    }

    /// POST `body` with `Content-Type: application/json` unless the caller overrides it.
    pub async fn post(
        &self,
        url: &str,
        body: String,
        headers: &HashMap<String, String>,
    ) -> HttpResponse {
        self.request(reqwest::Method::POST, url, Some(body), headers)
            .await
    }

    pub async fn get_json(&self, url: &str, headers: &HashMap<String, String>) -> JsonResponse {
        let response = self.get(url, headers).await;
        let mut out = JsonResponse {
            status_code: response.status_code,
            headers: response.headers,
            ..JsonResponse::default()
        };
        if let Some(error) = response.error {
            out.error = Some(error);
            return out;
        }
        match serde_json::from_str(&response.body) {
            Ok(data) => out.data = Some(data),
            Err(e) => {
                out.error = Some(format!("failed to parse JSON: {}", e));
                out.raw_body = Some(response.body);
            }
        }
        out
    }

    async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<String>,
        headers: &HashMap<String, String>,
    ) -> HttpResponse {
        let parsed = match self.allow.check_url(url) {
            Ok(u) => u,
            Err(e) => return HttpResponse::failed(e.to_string()),
        };
        let mut req = self.client.request(method, parsed);
        if let Some(body) = body {
            req = req
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }
        for (k, v) in headers {
            req = req.header(k.as_str(), v.as_str());
        }
        let res = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                return HttpResponse::failed(format!("request failed: {}", error_chain(e)))
            }
        };
        let status_code = res.status().as_u16();
        let headers = extract_headers(res.headers());
        match res.text().await {
            Ok(body) => HttpResponse {
                status_code,
                headers,
                body,
                error: None,
            },
            Err(e) => HttpResponse {
                status_code,
                headers,
                body: String::new(),
                error: Some(format!("failed to read response body: {}", e)),
            },
        }
    }

    /// Stream `url` into `dest`, creating parent directories. Non-2xx statuses are errors.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&mut (dyn FnMut(DownloadProgress) + Send)>,
    ) -> HttpResponse {
        let parsed = match self.allow.check_url(url) {
            Ok(u) => u,
            Err(e) => return HttpResponse::failed(e.to_string()),
        };
        let res = match self.client.get(parsed).send().await {
            Ok(r) => r,
            Err(e) => {
                return HttpResponse::failed(format!("request failed: {}", error_chain(e)))
            }
        };
        let status = res.status();
        if !status.is_success() {
            return HttpResponse {
                status_code: status.as_u16(),
                error: Some(format!("HTTP error: {}", status)),
                ..HttpResponse::default()
            };
        }
        let headers = extract_headers(res.headers());
        let total = res.content_length();

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return HttpResponse::failed(format!("failed to create output directory: {}", e));
            }
        }
        let mut file = match tokio::fs::File::create(dest).await {
            Ok(f) => f,
            Err(e) => return HttpResponse::failed(format!("failed to create output file: {}", e)),
        };

        let downloaded = match write_body(res, &mut file, total, progress).await {
            Ok(n) => n,
            Err(message) => {
                drop(file);
                // Never leave a truncated download behind.
                if let Err(e) = tokio::fs::remove_file(dest).await {
                    log::warn!("failed to remove partial download {}: {}", dest.display(), e);
                }
                return HttpResponse::failed(message);
            }
        };
        HttpResponse {
            status_code: status.as_u16(),
            headers,
            body: format!("Downloaded {} bytes to {}", downloaded, dest.display()),
            error: None,
        }
    }
}

/// Stream the response body into `file`, reporting progress after every chunk.
async fn write_body(
    res: reqwest::Response,
    file: &mut tokio::fs::File,
    total: Option<u64>,
    mut progress: Option<&mut (dyn FnMut(DownloadProgress) + Send)>,
) -> Result<u64, String> {
    let started = Instant::now();
    let mut downloaded = 0u64;
    let mut stream = res.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("failed to read response: {}", error_chain(e)))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("failed to write to file: {}", e))?;
        downloaded += chunk.len() as u64;
        if let Some(cb) = progress.as_deref_mut() {
            let secs = started.elapsed().as_secs_f64().max(f64::EPSILON);
            cb(DownloadProgress {
                downloaded,
                total,
                bytes_per_sec: downloaded as f64 / secs,
            });
        }
    }
    file.flush()
        .await
        .map_err(|e| format!("failed to write to file: {}", e))?;
    Ok(downloaded)
}

/// `e` followed by its sources (redirect policy refusals live in the source).
fn error_chain(e: reqwest::Error) -> String {
    format!("{:#}", anyhow::Error::new(e))
}

fn extract_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            out.entry(name.as_str().to_string())
                .or_insert_with(|| v.to_string());
        }
    }
    out
}

/// Human-readable byte count (`1.5 MB`).
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < 5 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!(
        "{:.1} {}B",
        bytes as f64 / div as f64,
        ['K', 'M', 'G', 'T', 'P', 'E'][exp]
    )
}
