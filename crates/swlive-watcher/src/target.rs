//! What gets built, where it goes, and under which URL it is served.

use std::path::{Path, PathBuf};
use swlive_core::BuildMode;

/// File name used when none is configured.
pub const DEFAULT_WORKER_NAME: &str = "sw.js";

/// A fully resolved build target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// Project root; the bundler runs with this as its working directory.
    pub root: PathBuf,
    /// Absolute path of the worker entry point.
    pub entry: PathBuf,
    /// Directory the worker script is written to.
    pub output_dir: PathBuf,
    /// Output file name, always ending in `.js`.
    pub name: String,
    /// URL scope the worker is registered under, always ending in `/`.
    pub scope: String,
    pub mode: BuildMode,
}

impl BuildTarget {
    /// Path of the produced worker script.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.name)
    }

    /// URL the page registers the worker from.
    pub fn worker_url(&self) -> String {
        format!("{}{}", self.scope, self.name)
    }

    /// Entry path relative to the project root, for messages.
    pub fn entry_display(&self) -> String {
        match self.entry.strip_prefix(&self.root) {
            Ok(rel) => format!("./{}", rel.display()),
            Err(_) => self.entry.display().to_string(),
        }
    }
}

/// Normalizes a configured worker name.
///
/// Only the last path component is kept and a trailing `.js` is stripped and
/// re-added, so `workers/app`, `app.js` and `app` all become `app.js`.
pub fn resolve_worker_name(name: Option<&str>) -> String {
    let base = name
        .filter(|n| !n.is_empty())
        .and_then(|n| Path::new(n).file_name())
        .and_then(|n| n.to_str());

    match base {
        Some(base) => format!("{}.js", base.strip_suffix(".js").unwrap_or(base)),
        None => DEFAULT_WORKER_NAME.to_string(),
    }
}

/// Scope derived from the application's base path.
pub fn resolve_scope(base_path: Option<&str>) -> String {
    match base_path {
        Some(base) if !base.is_empty() => format!("{}/", base.trim_end_matches('/')),
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_worker_name() {
        assert_eq!(resolve_worker_name(None), "sw.js");
        assert_eq!(resolve_worker_name(Some("")), "sw.js");
        assert_eq!(resolve_worker_name(Some("worker")), "worker.js");
        assert_eq!(resolve_worker_name(Some("worker.js")), "worker.js");
        assert_eq!(resolve_worker_name(Some("nested/dir/app.js")), "app.js");
        assert_eq!(resolve_worker_name(Some("app.mjs")), "app.mjs.js");
    }

    #[test]
    fn test_resolve_scope() {
        assert_eq!(resolve_scope(None), "/");
        assert_eq!(resolve_scope(Some("")), "/");
        assert_eq!(resolve_scope(Some("/docs")), "/docs/");
    }

    #[test]
    fn test_target_paths() {
        let target = BuildTarget {
            root: PathBuf::from("/app"),
            entry: PathBuf::from("/app/src/sw.ts"),
            output_dir: PathBuf::from("/app/public"),
            name: "sw.js".into(),
            scope: "/docs/".into(),
            mode: BuildMode::Development,
        };

        assert_eq!(target.output_path(), PathBuf::from("/app/public/sw.js"));
        assert_eq!(target.worker_url(), "/docs/sw.js");
        assert_eq!(target.entry_display(), "./src/sw.ts");
    }
}
