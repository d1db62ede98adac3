//! URL shaping for workflow downloads: raw-content rewrites, file names, temp names and the
//! code-hosting mirror.

use sha2::{Digest, Sha256};
use url::Url;

use crate::script::EXTENSION;

/// Fallback host for code-hosting downloads.
pub const MIRROR_HOST: &str = "toolchains.mirror.toulan.fun";

const FALLBACK_FILENAME: &str = "workflow.js";
const TEMP_SUFFIX: &str = ".download";

fn host(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_ascii_lowercase()
}

/// Rewrite "human view" URLs into their raw-content form:
/// `github.com/o/r/blob/ref/f` becomes `raw.githubusercontent.com/o/r/ref/f`, and GitLab
/// `/-/blob/` becomes `/-/raw/`. Anything else is returned unchanged.
pub fn to_raw_url(url: &Url) -> Url {
    let host = host(url);
    let path = url.path();
    if host == "github.com" && path.contains("/blob/") {
        let raw = format!(
            "https://raw.githubusercontent.com{}",
            path.replacen("/blob/", "/", 1)
        );
        if let Ok(u) = Url::parse(&raw) {
            return u;
        }
    }
    if (host == "gitlab.com" || host.ends_with(".gitlab.com")) && path.contains("/-/blob/") {
        let mut u = url.clone();
        u.set_path(&path.replacen("/-/blob/", "/-/raw/", 1));
        return u;
    }
    url.clone()
}

/// Replace characters invalid in file names with `_` and trim spaces and dots.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Append `.js` unless already present (case-insensitive).
pub fn with_script_extension(name: String) -> String {
    let suffix = format!(".{}", EXTENSION);
    if name.to_ascii_lowercase().ends_with(&suffix) {
        name
    } else {
        name + &suffix
    }
}

/// Installed file name: the caller's choice if given, else the last URL path segment.
pub fn target_filename(url: &Url, requested: Option<&str>) -> Option<String> {
    if let Some(name) = requested.map(str::trim).filter(|n| !n.is_empty()) {
        return Some(with_script_extension(sanitize_filename(name)));
    }
    let last = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty())?;
    Some(sanitize_filename(&with_script_extension(last.to_string())))
}

/// `<stem>-<sha256(url)[..10]>.download`, unique per source URL.
pub fn temp_name(filename: &str, url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    let stem = std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("workflow");
    format!("{}-{}{}", stem, &hex[..10], TEMP_SUFFIX)
}

/// Hosts whose failed downloads may be retried against [`MIRROR_HOST`].
pub fn is_code_host(url: &Url) -> bool {
    let host = host(url);
    host == "github.com" || host == "raw.githubusercontent.com" || host.ends_with(".github.com")
}

/// Mirror location `/<owner>/<repo>/latest/<file>` for raw and blob GitHub URLs. The ref in the
/// original URL is mapped to `latest`.
pub fn mirror_url(url: &Url) -> Option<Url> {
    let host = host(url);
    let parts: Vec<&str> = url.path().trim_matches('/').split('/').collect();
    let min_parts = match host.as_str() {
        "raw.githubusercontent.com" => 4,
        "github.com" if url.path().contains("/blob/") => 5,
        _ => return None,
    };
    if parts.len() < min_parts {
        return None;
    }
    let file = parts.last()?;
    Url::parse(&format!(
        "https://{}/{}/{}/latest/{}",
        MIRROR_HOST, parts[0], parts[1], file
    ))
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn blob_urls_become_raw() {
        assert_eq!(
            to_raw_url(&u("https://github.com/o/r/blob/main/dir/wf.js")).as_str(),
            "https://raw.githubusercontent.com/o/r/main/dir/wf.js"
        );
        assert_eq!(
            to_raw_url(&u("https://gitlab.com/g/p/-/blob/main/wf.js")).as_str(),
            "https://gitlab.com/g/p/-/raw/main/wf.js"
        );
        let plain = u("https://example.com/a/blob/b.js");
        assert_eq!(to_raw_url(&plain), plain);
    }

    #[test]
    fn filenames_are_sanitized_and_get_extension() {
        assert_eq!(sanitize_filename("a<b>:c.js"), "a_b__c.js");
        assert_eq!(sanitize_filename(" ..  "), "workflow.js");
        assert_eq!(
            target_filename(&u("https://x.org/p/tool"), None).unwrap(),
            "tool.js"
        );
        assert_eq!(
            target_filename(&u("https://x.org/p/Tool.JS"), None).unwrap(),
            "Tool.JS"
        );
        assert_eq!(
            target_filename(&u("https://x.org/p/a.js"), Some("my:flow")).unwrap(),
            "my_flow.js"
        );
        assert!(target_filename(&u("https://x.org/"), None).is_none());
    }

    #[test]
    fn temp_name_is_stable_per_url() {
        let a = temp_name("wf.js", "https://x.org/wf.js");
        assert!(a.starts_with("wf-"));
        assert!(a.ends_with(".download"));
        assert_eq!(a.len(), "wf-".len() + 10 + ".download".len());
        assert_eq!(a, temp_name("wf.js", "https://x.org/wf.js"));
        assert_ne!(a, temp_name("wf.js", "https://y.org/wf.js"));
    }

    #[test]
    fn mirror_maps_ref_to_latest() {
        assert_eq!(
            mirror_url(&u("https://raw.githubusercontent.com/o/r/v1.2/sub/wf.js"))
                .unwrap()
                .as_str(),
            "https://toolchains.mirror.toulan.fun/o/r/latest/wf.js"
        );
        assert_eq!(
            mirror_url(&u("https://github.com/o/r/blob/main/wf.js"))
                .unwrap()
                .as_str(),
            "https://toolchains.mirror.toulan.fun/o/r/latest/wf.js"
        );
        assert!(mirror_url(&u("https://gitlab.com/o/r/-/raw/main/wf.js")).is_none());
        assert!(is_code_host(&u("https://raw.githubusercontent.com/x")));
        assert!(!is_code_host(&u("https://gitlab.com/x")));
    }
}
