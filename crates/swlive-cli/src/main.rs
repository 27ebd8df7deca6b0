//! swlive CLI - Command-line interface for swlive
//!
//! Builds a service worker with an external bundler, rebuilds it on change
//! and tells open browser tabs when to reload.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::error::Error;
use std::path::PathBuf;
use swlive_server::{FatalBuild, DEFAULT_PORT};
use swlive_watcher::ProbeError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod console;

use config::{ConfigError, Overrides};

#[derive(Parser)]
#[command(name = "swlive")]
#[command(author = "swlive Contributors")]
#[command(version)]
#[command(about = "Service worker builds with live reload", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize swlive in a project
    Init {
        /// Project root (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Build in watch mode and live reload connected browsers
    Dev {
        /// Project root (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Live reload port
        #[arg(short, long, env = "SWLIVE_PORT")]
        port: Option<String>,

        /// Address to bind the live reload server to
        #[arg(long)]
        host: Option<String>,

        /// Do not start the live reload server
        #[arg(long)]
        no_livereload: bool,
    },

    /// Build the service worker once for production
    Build {
        /// Project root (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Print the browser live reload client
    Client {
        /// Live reload port the client connects to
        #[arg(short, long, env = "SWLIVE_PORT", default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Write the script to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check configuration, entry and bundler
    Doctor {
        /// Project root (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Init { path } => commands::init(&path),
        Commands::Dev {
            path,
            port,
            host,
            no_livereload,
        } => {
            let overrides = Overrides {
                port,
                host,
                no_livereload,
            };
            commands::dev(&path, &overrides).await
        }
        Commands::Build { path } => commands::build(&path).await,
        Commands::Client { port, output } => commands::client(port, output.as_deref()),
        Commands::Doctor { path } => commands::doctor(&path).await,
    };

    if let Err(e) = result {
        if !already_reported(e.as_ref()) {
            eprintln!("{} {}", "error:".red().bold(), e);
        }
        std::process::exit(exit_code(e.as_ref()));
    }
}

/// Fatal build errors were logged when they happened.
fn already_reported(e: &(dyn Error + 'static)) -> bool {
    e.is::<FatalBuild>()
}

/// Configuration problems exit with 2, everything else with 1.
fn exit_code(e: &(dyn Error + 'static)) -> i32 {
    if e.is::<ConfigError>() || e.is::<ProbeError>() {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exit_codes() {
        let fatal = FatalBuild {
            module: None,
            error: "X".into(),
        };
        assert_eq!(exit_code(&fatal), 1);
        assert_eq!(exit_code(&ConfigError::NoEntry(PathBuf::from("x"))), 2);
        assert_eq!(exit_code(&ProbeError::EmptyCommand), 2);

        let other: Box<dyn Error> = "boom".into();
        assert_eq!(exit_code(other.as_ref()), 1);
    }

    #[test]
    fn test_only_fatal_builds_skip_reporting() {
        let fatal = FatalBuild {
            module: None,
            error: "X".into(),
        };
        assert!(already_reported(&fatal));
        assert!(!already_reported(&ConfigError::NoEntry(PathBuf::from("x"))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_production_build_exits_once_with_one() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/sw.js"), "self.skipWaiting();").unwrap();

        let script = root.join("bundle.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             if [ \"$1\" = \"--version\" ]; then echo 'bundle 1.0.0'; exit 0; fi\n\
             echo X >&2\n\
             exit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = serde_json::json!({
            "entry": "src/sw.js",
            "bundler": { "command": [script.display().to_string(), "{entry}", "{output}"] }
        });
        std::fs::create_dir_all(root.join(config::CONFIG_DIR)).unwrap();
        std::fs::write(config::Config::path(root), config.to_string()).unwrap();

        let err = commands::build(root).await.unwrap_err();

        let fatal = err.downcast_ref::<FatalBuild>().expect("fatal build error");
        assert_eq!(fatal.error, "X");
        assert_eq!(fatal.module.as_deref(), Some("./src/sw.js"));
        assert_eq!(exit_code(err.as_ref()), 1);
        assert!(already_reported(err.as_ref()));
    }

    #[test]
    fn test_dev_flags() {
        let cli = Cli::try_parse_from(["swlive", "dev", "site", "--port", "5000", "--no-livereload"]).unwrap();
        match cli.command {
            Commands::Dev {
                path,
                port,
                no_livereload,
                ..
            } => {
                assert_eq!(path, PathBuf::from("site"));
                assert_eq!(port.as_deref(), Some("5000"));
                assert!(no_livereload);
            }
            _ => panic!("expected dev"),
        }
    }
}
