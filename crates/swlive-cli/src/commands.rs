//! CLI command implementations.

use crate::config::{Config, Overrides, Settings, CONFIG_DIR};
use crate::console;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use swlive_core::BuildMode;
use swlive_server::{
    render_client_script, Broadcaster, BuildOrchestrator, GateOutcome, LiveReloadServer,
    ServerConfig, TerminationHooks, DEFAULT_RETRY_MS,
};
use swlive_watcher::{probe_bundler, run_build_loop, watch_sources};
use tokio::sync::mpsc;
use tracing::debug;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Initialize swlive in a directory.
pub fn init(path: &Path) -> Result<()> {
    let config_path = Config::path(path);

    if config_path.exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    fs::create_dir_all(path.join(CONFIG_DIR))?;
    fs::write(&config_path, serde_json::to_string_pretty(&Config::template())?)?;

    println!("{} Initialized swlive in {}", "✓".green(), path.display());
    println!("  Edit {} to point at your worker", config_path.display().to_string().cyan());
    println!("  Run {} to start developing", "swlive dev".cyan());

    Ok(())
}

fn load_settings(path: &Path, mode: BuildMode, overrides: &Overrides) -> Result<Settings> {
    let config = Config::load(path)?;
    let settings = config.resolve(path, mode, overrides)?;
    debug!(?settings, "Resolved settings");
    Ok(settings)
}

/// Develop with watch mode and live reload.
pub async fn dev(path: &Path, overrides: &Overrides) -> Result<()> {
    let mode = BuildMode::Development;
    let settings = load_settings(path, mode, overrides)?;
    let bundler = probe_bundler(&settings.bundler, settings.target.clone()).await?;

    let hooks = TerminationHooks::new();
    let _exit = hooks.exit_guard();
    hooks.listen_for_signals()?;

    let server = if settings.livereload {
        let config = ServerConfig {
            addr: settings.addr,
            retry_ms: DEFAULT_RETRY_MS,
        };
        let server = LiveReloadServer::listen(config, &hooks, |addr| {
            console::info(format!("live reload server listening on {}", addr));
        })
        .await?;
        Some(server)
    } else {
        console::warn("live reload disabled");
        None
    };
    let broadcaster = server
        .as_ref()
        .map(LiveReloadServer::broadcaster)
        .unwrap_or_else(Broadcaster::disabled);

    let (trigger_tx, trigger_rx) = mpsc::channel(1);
    let _watcher = watch_sources(
        &settings.watch,
        vec![settings.target.output_dir.clone()],
        settings.debounce,
        trigger_tx,
    )?;

    let (result_tx, result_rx) = mpsc::channel(8);
    let (orchestrator, gate) = BuildOrchestrator::new(mode, broadcaster);

    console::wait(format!("compiling {}...", settings.target.entry_display()));
    tokio::spawn(run_build_loop(Arc::new(bundler), Some(trigger_rx), result_tx));
    let orchestrating = tokio::spawn(orchestrator.run(result_rx));

    let worker_url = settings.target.worker_url();
    tokio::spawn(async move {
        if let GateOutcome::Ready { .. } = gate.wait().await {
            console::ready(format!("service worker available at {}", worker_url));
        }
    });

    tokio::select! {
        cause = hooks.terminated() => {
            console::event(format!("shutting down ({})", cause));
        }
        finished = orchestrating => {
            finished??;
        }
    }

    Ok(())
}

/// Build the worker once for production.
pub async fn build(path: &Path) -> Result<()> {
    let mode = BuildMode::Production;
    let settings = load_settings(path, mode, &Overrides::default())?;
    let bundler = probe_bundler(&settings.bundler, settings.target.clone()).await?;

    let hooks = TerminationHooks::new();
    let _exit = hooks.exit_guard();
    hooks.listen_for_signals()?;

    let (result_tx, result_rx) = mpsc::channel(1);
    let (orchestrator, gate) = BuildOrchestrator::new(mode, Broadcaster::disabled());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(format!("compiling {}...", settings.target.entry_display()));

    tokio::spawn(run_build_loop(Arc::new(bundler), None, result_tx));

    let finished = tokio::select! {
        cause = hooks.terminated() => {
            spinner.finish_and_clear();
            return Err(format!("build interrupted by {}", cause).into());
        }
        finished = orchestrator.run(result_rx) => finished,
    };
    spinner.finish_and_clear();
    finished?;

    match gate.outcome() {
        Some(GateOutcome::Ready { hash }) => {
            console::ready(format!(
                "compiled {} ({})",
                settings.target.output_path().display(),
                &hash[..hash.len().min(12)]
            ));
            Ok(())
        }
        Some(GateOutcome::Failed { error }) => Err(error.into()),
        None => Err("the bundler finished without producing a result".into()),
    }
}

/// Print or write the browser client script.
pub fn client(port: u16, output: Option<&Path>) -> Result<()> {
    let script = render_client_script(port);

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, script)?;
            println!("{} Wrote client script to {}", "✓".green(), path.display());
        }
        None => print!("{}", script),
    }

    Ok(())
}

/// Check configuration, entry and bundler.
pub async fn doctor(path: &Path) -> Result<()> {
    use std::net::TcpListener;

    println!("{}", "swlive doctor".cyan().bold());
    println!("{}", "═".repeat(50));

    let mut all_ok = true;

    let config = match Config::load(path) {
        Ok(config) => {
            println!("{} Config found", "✓".green());
            Some(config)
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            None
        }
    };

    let settings = match config.as_ref() {
        Some(config) => match config.resolve(path, BuildMode::Development, &Overrides::default()) {
            Ok(settings) => {
                println!(
                    "{} Entry {} is readable",
                    "✓".green(),
                    settings.target.entry_display()
                );
                Some(settings)
            }
            Err(e) => {
                println!("{} {}", "✗".red(), e);
                None
            }
        },
        None => None,
    };

    match settings {
        Some(settings) => {
            match probe_bundler(&settings.bundler, settings.target.clone()).await {
                Ok(bundler) => {
                    let version = bundler
                        .version()
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "unknown version".to_string());
                    println!("{} Bundler available ({})", "✓".green(), version);
                }
                Err(e) => {
                    println!("{} {}", "✗".red(), e);
                    all_ok = false;
                }
            }

            match TcpListener::bind(settings.addr) {
                Ok(_) => println!("{} Port {} is available", "✓".green(), settings.addr.port()),
                Err(_) => println!(
                    "{} Port {} is in use (is `swlive dev` already running?)",
                    "•".blue(),
                    settings.addr.port()
                ),
            }
        }
        None => all_ok = false,
    }

    println!("{}", "═".repeat(50));

    if !all_ok {
        return Err("some checks require attention".into());
    }

    console::ready("all checks passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_writes_template_once() {
        let dir = tempdir().unwrap();
        init(dir.path()).unwrap();

        let written = Config::load(dir.path()).unwrap();
        assert_eq!(written, Config::template());

        fs::write(Config::path(dir.path()), r#"{ "entry": "worker.js" }"#).unwrap();
        init(dir.path()).unwrap();
        assert_eq!(
            Config::load(dir.path()).unwrap().entry.as_deref(),
            Some("worker.js")
        );
    }

    #[test]
    fn test_client_writes_script() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("static/swlive.js");

        client(4123, Some(&output)).unwrap();

        let script = fs::read_to_string(output).unwrap();
        assert!(script.contains("'4123'"));
    }

    #[tokio::test]
    async fn test_doctor_fails_without_config() {
        let dir = tempdir().unwrap();
        assert!(doctor(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_doctor_fails_on_unreadable_entry() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        fs::write(Config::path(dir.path()), r#"{ "entry": "src/missing.js" }"#).unwrap();

        assert!(doctor(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_build_without_config_is_config_error() {
        let dir = tempdir().unwrap();
        let err = build(dir.path()).await.unwrap_err();
        assert!(err.is::<crate::config::ConfigError>());
    }
}
