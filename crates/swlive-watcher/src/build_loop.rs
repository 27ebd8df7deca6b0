//! The rebuild loop.

use crate::bundler::Bundler;
use std::sync::Arc;
use std::time::Instant;
use swlive_core::BuildResult;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Runs builds one at a time and sends each result downstream.
///
/// The first build starts immediately. With `triggers` present the loop keeps
/// rebuilding on every trigger until the trigger channel closes; without it a
/// single build is run. The loop also ends as soon as nobody listens for
/// results any more.
pub async fn run_build_loop(
    bundler: Arc<dyn Bundler>,
    triggers: Option<mpsc::Receiver<()>>,
    results: mpsc::Sender<BuildResult>,
) {
    if !build_once(bundler.as_ref(), &results).await {
        return;
    }

    let Some(mut triggers) = triggers else {
        return;
    };

    info!("Watching for changes");

    while triggers.recv().await.is_some() {
        if !build_once(bundler.as_ref(), &results).await {
            break;
        }
    }

    debug!("Build loop stopped");
}

async fn build_once(bundler: &dyn Bundler, results: &mpsc::Sender<BuildResult>) -> bool {
    let start = Instant::now();
    let result = bundler.build().await;

    debug!(
        success = result.success,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Build finished"
    );

    results.send(result).await.is_ok()
}
