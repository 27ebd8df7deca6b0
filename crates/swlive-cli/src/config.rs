//! Project configuration.
//!
//! Settings live in `.swlive/config.json` under the project root. Every key is
//! optional except `entry`; command-line flags override what the file says.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use swlive_core::BuildMode;
use swlive_server::DEFAULT_PORT;
use swlive_watcher::{resolve_scope, resolve_worker_name, BuildTarget, BundlerConfig};
use thiserror::Error;

pub const CONFIG_DIR: &str = ".swlive";
pub const CONFIG_FILE: &str = "config.json";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_DIR: &str = "public";
const DEFAULT_DEBOUNCE_MS: u64 = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("swlive is not initialized in {0} (run `swlive init`)")]
    NotInitialized(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no `entry` configured in {0}")]
    NoEntry(PathBuf),

    #[error("service worker entry {path} is not readable: {source}")]
    EntryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot resolve host `{0}`")]
    InvalidHost(String),
}

/// The on-disk configuration, as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Worker entry point, relative to the project root.
    pub entry: Option<String>,
    /// Output file name; `.js` is appended when missing.
    pub name: Option<String>,
    /// Live reload on or off; follows the command's mode when unset.
    pub livereload: Option<bool>,
    /// Live reload port, as a number or a numeric string.
    pub port: Option<Value>,
    pub host: Option<String>,
    /// Application base path; the worker scope is derived from it.
    pub base_path: Option<String>,
    /// Output directory, relative to the project root.
    pub public: Option<String>,
    /// Directories to watch; defaults to the entry's directory.
    pub watch: Vec<String>,
    pub debounce_ms: Option<u64>,
    pub bundler: BundlerConfig,
}

/// Values from the command line that win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<String>,
    pub host: Option<String>,
    pub no_livereload: bool,
}

/// Everything a command needs, fully resolved.
#[derive(Debug, Clone)]
pub struct Settings {
    pub target: BuildTarget,
    pub bundler: BundlerConfig,
    pub livereload: bool,
    pub addr: SocketAddr,
    pub watch: Vec<PathBuf>,
    pub debounce: Duration,
}

impl Config {
    /// Path of the config file for a project root.
    pub fn path(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// The file `swlive init` writes.
    pub fn template() -> Self {
        Self {
            entry: Some("src/sw.js".to_string()),
            name: Some(swlive_watcher::DEFAULT_WORKER_NAME.to_string()),
            livereload: None,
            port: Some(Value::from(DEFAULT_PORT)),
            host: Some(DEFAULT_HOST.to_string()),
            base_path: None,
            public: Some(DEFAULT_PUBLIC_DIR.to_string()),
            watch: Vec::new(),
            debounce_ms: Some(DEFAULT_DEBOUNCE_MS),
            bundler: BundlerConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(root);
        if !path.exists() {
            return Err(ConfigError::NotInitialized(root.to_path_buf()));
        }

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Resolves paths, names and addresses against `root` for a session in `mode`.
    pub fn resolve(
        &self,
        root: &Path,
        mode: BuildMode,
        overrides: &Overrides,
    ) -> Result<Settings, ConfigError> {
        let root = normalize(root);

        let entry = self
            .entry
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ConfigError::NoEntry(Self::path(&root)))?;
        let entry = normalize(&root.join(entry));
        check_readable(&entry)?;

        let output_dir = normalize(&root.join(self.public.as_deref().unwrap_or(DEFAULT_PUBLIC_DIR)));

        let target = BuildTarget {
            root: root.clone(),
            entry: entry.clone(),
            output_dir,
            name: resolve_worker_name(self.name.as_deref()),
            scope: resolve_scope(self.base_path.as_deref()),
            mode,
        };

        let livereload = !overrides.no_livereload && self.livereload.unwrap_or(mode.is_interactive());

        let port = match &overrides.port {
            Some(port) => resolve_port(Some(&Value::from(port.as_str()))),
            None => resolve_port(self.port.as_ref()),
        };
        let host = overrides
            .host
            .as_deref()
            .or(self.host.as_deref())
            .unwrap_or(DEFAULT_HOST);
        let addr = resolve_addr(host, port)?;

        let watch = if self.watch.is_empty() {
            vec![entry.parent().map(Path::to_path_buf).unwrap_or_else(|| root.clone())]
        } else {
            self.watch.iter().map(|dir| normalize(&root.join(dir))).collect()
        };

        Ok(Settings {
            target,
            bundler: self.bundler.clone(),
            livereload,
            addr,
            watch,
            debounce: Duration::from_millis(self.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)),
        })
    }
}

/// Live reload port from a configured value.
///
/// Integers in `1..=65535` and strings holding one are accepted; anything else
/// falls back to the default port.
pub fn resolve_port(value: Option<&Value>) -> u16 {
    let port = match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse::<u16>().ok(),
        _ => None,
    };

    match port {
        Some(port) if port != 0 => port,
        _ => DEFAULT_PORT,
    }
}

fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::InvalidHost(host.to_string()))
}

fn check_readable(path: &Path) -> Result<(), ConfigError> {
    let unreadable = |source| ConfigError::EntryUnreadable {
        path: path.to_path_buf(),
        source,
    };

    if fs::metadata(path).map_err(unreadable)?.is_dir() {
        return Err(unreadable(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "is a directory",
        )));
    }
    fs::File::open(path).map(drop).map_err(unreadable)
}

/// Lexically removes `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn project(config: &str) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/sw.js"), "self.addEventListener('fetch', () => {});").unwrap();
        fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        fs::write(Config::path(dir.path()), config).unwrap();
        dir
    }

    #[test]
    fn test_resolve_port() {
        assert_eq!(resolve_port(None), 4000);
        assert_eq!(resolve_port(Some(&Value::from(8080))), 8080);
        assert_eq!(resolve_port(Some(&Value::from("8081"))), 8081);
        assert_eq!(resolve_port(Some(&Value::from(0))), 4000);
        assert_eq!(resolve_port(Some(&Value::from(70000))), 4000);
        assert_eq!(resolve_port(Some(&Value::from(-1))), 4000);
        assert_eq!(resolve_port(Some(&Value::from("abc"))), 4000);
        assert_eq!(resolve_port(Some(&Value::Bool(true))), 4000);
    }

    #[test]
    fn test_missing_config_is_not_initialized() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(ConfigError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_template_round_trips_through_disk() {
        let dir = project(&serde_json::to_string_pretty(&Config::template()).unwrap());
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded, Config::template());
    }

    #[test]
    fn test_resolve_defaults() {
        let dir = project(r#"{ "entry": "./src/sw.js" }"#);
        let config = Config::load(dir.path()).unwrap();
        let settings = config
            .resolve(dir.path(), BuildMode::Development, &Overrides::default())
            .unwrap();

        assert_eq!(settings.target.name, "sw.js");
        assert_eq!(settings.target.scope, "/");
        assert_eq!(settings.target.entry, dir.path().join("src/sw.js"));
        assert_eq!(settings.target.output_dir, dir.path().join("public"));
        assert_eq!(settings.addr.port(), 4000);
        assert!(settings.livereload);
        assert_eq!(settings.watch, vec![dir.path().join("src")]);
        assert_eq!(settings.debounce, Duration::from_millis(5));
    }

    #[test]
    fn test_livereload_follows_mode() {
        let dir = project(r#"{ "entry": "src/sw.js" }"#);
        let config = Config::load(dir.path()).unwrap();

        let prod = config
            .resolve(dir.path(), BuildMode::Production, &Overrides::default())
            .unwrap();
        assert!(!prod.livereload);

        let disabled = config
            .resolve(
                dir.path(),
                BuildMode::Development,
                &Overrides {
                    no_livereload: true,
                    ..Overrides::default()
                },
            )
            .unwrap();
        assert!(!disabled.livereload);
    }

    #[test]
    fn test_overrides_win() {
        let dir = project(r#"{ "entry": "src/sw.js", "port": "5000", "basePath": "/app", "name": "worker" }"#);
        let config = Config::load(dir.path()).unwrap();

        let settings = config
            .resolve(
                dir.path(),
                BuildMode::Development,
                &Overrides {
                    port: Some("6000".into()),
                    host: Some("127.0.0.1".into()),
                    no_livereload: false,
                },
            )
            .unwrap();

        assert_eq!(settings.addr.port(), 6000);
        assert_eq!(settings.target.worker_url(), "/app/worker.js");
    }

    #[test]
    fn test_unreadable_entry() {
        let dir = project(r#"{ "entry": "src/missing.js" }"#);
        let config = Config::load(dir.path()).unwrap();

        let err = config
            .resolve(dir.path(), BuildMode::Development, &Overrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::EntryUnreadable { .. }));

        let dir = project(r#"{ "entry": "src" }"#);
        let config = Config::load(dir.path()).unwrap();
        assert!(config
            .resolve(dir.path(), BuildMode::Development, &Overrides::default())
            .is_err());
    }

    #[test]
    fn test_missing_entry() {
        let dir = project("{}");
        let config = Config::load(dir.path()).unwrap();
        assert!(matches!(
            config.resolve(dir.path(), BuildMode::Production, &Overrides::default()),
            Err(ConfigError::NoEntry(_))
        ));
    }

    #[test]
    fn test_invalid_json() {
        let dir = project("{ not json");
        assert!(matches!(Config::load(dir.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
    }
}
