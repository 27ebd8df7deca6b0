//! swlive watcher - building the worker script and noticing when to rebuild
//!
//! This crate owns everything between "a source file changed" and "here is a
//! finished [`BuildResult`]":
//!
//! - [`probe_bundler`] checks that the configured bundler exists and is
//!   recent enough, returning a typed [`CommandBundler`] handle.
//! - [`CommandBundler`] runs the bundler and hashes its output.
//! - [`watch_sources`] turns file-system events into debounced rebuild triggers.
//! - [`run_build_loop`] runs one build at a time and streams results out.
//!
//! [`BuildResult`]: swlive_core::BuildResult

mod build_loop;
mod bundler;
mod hash;
mod target;
mod watcher;

pub use build_loop::run_build_loop;
pub use bundler::{probe_bundler, Bundler, BundlerConfig, CommandBundler, ProbeError};
pub use hash::{content_sha256, file_sha256};
pub use target::{resolve_scope, resolve_worker_name, BuildTarget, DEFAULT_WORKER_NAME};
pub use watcher::{watch_sources, SourceWatcher, WatchError};
