//! Build orchestration.
//!
//! Consumes build results in arrival order, runs them through the
//! recompilation state machine and carries out each decision: broadcast
//! `wait` / `reload`, open the startup gate, or escalate a fatal failure.

use crate::gate::{startup_gate, GateTrigger, StartupGate};
use crate::server::Broadcaster;
use swlive_core::{BuildMode, BuildResult, Decision, RecompilationState};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// A build error that ends a non-interactive session.
///
/// The error has already been reported by the orchestrator when this is
/// returned; callers only need to exit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct FatalBuild {
    pub module: Option<String>,
    pub error: String,
}

/// Drives one build session.
pub struct BuildOrchestrator {
    mode: BuildMode,
    state: RecompilationState,
    broadcaster: Broadcaster,
    gate: GateTrigger,
}

impl BuildOrchestrator {
    /// Creates an orchestrator and the gate the host waits on.
    pub fn new(mode: BuildMode, broadcaster: Broadcaster) -> (Self, StartupGate) {
        let (gate, waiter) = startup_gate();
        (
            Self {
                mode,
                state: RecompilationState::new(),
                broadcaster,
                gate,
            },
            waiter,
        )
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn state(&self) -> &RecompilationState {
        &self.state
    }

    /// Handles one result.
    pub fn consume(&mut self, result: &BuildResult) -> Result<Decision, FatalBuild> {
        let decision = self.state.apply(result, self.mode);

        match &decision {
            Decision::Wait { module, error, hash } => {
                report(module.as_deref(), error);
                debug!(hash = %hash, "Errors present, reload withheld");
            }
            Decision::Fatal { module, error } => {
                report(module.as_deref(), error);
                self.gate.fail(error.clone());
                return Err(FatalBuild {
                    module: module.clone(),
                    error: error.clone(),
                });
            }
            Decision::Reload { hash } => {
                info!(hash = %hash, "compiled service worker successfully");
                info!("reloading...");
            }
            Decision::FirstSuccess { hash } => {
                info!(hash = %hash, "compiled service worker successfully");
                self.gate.release(hash.clone());
            }
            Decision::DuplicateError => debug!("Same error as last build, suppressed"),
            Decision::Unchanged => debug!("Output unchanged"),
        }

        if let Some(event) = decision.event() {
            self.broadcaster.send(&event);
        }

        Ok(decision)
    }

    /// Consumes results until the channel closes or a fatal error occurs.
    pub async fn run(mut self, mut results: mpsc::Receiver<BuildResult>) -> Result<(), FatalBuild> {
        while let Some(result) = results.recv().await {
            self.consume(&result)?;
        }
        debug!("Build results channel closed");
        Ok(())
    }
}

fn report(module: Option<&str>, error: &str) {
    match module {
        Some(module) => error!("{}\n{}", module, error),
        None => error!("{}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateOutcome;
    use crate::server::Notification;
    use swlive_core::BuildError;
    use tokio::sync::mpsc::error::TryRecvError;

    fn failing(text: &str) -> BuildResult {
        BuildResult::failure("broken", vec![BuildError::in_module("src/sw.ts", text)])
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<(String, String)> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(n) => out.push((n.event, n.payload)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    #[test]
    fn test_first_result_opens_gate_without_reload() {
        let (broadcaster, mut rx) = Broadcaster::detached();
        let (mut orchestrator, gate) = BuildOrchestrator::new(BuildMode::Development, broadcaster);

        assert!(gate.outcome().is_none());
        let decision = orchestrator.consume(&BuildResult::success("h1")).unwrap();

        assert_eq!(decision, Decision::FirstSuccess { hash: "h1".into() });
        assert_eq!(gate.outcome(), Some(GateOutcome::Ready { hash: "h1".into() }));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_repeated_hash_reloads_once() {
        let (broadcaster, mut rx) = Broadcaster::detached();
        let (mut orchestrator, _gate) = BuildOrchestrator::new(BuildMode::Development, broadcaster);

        for hash in ["h1", "h1", "h1", "h2"] {
            orchestrator.consume(&BuildResult::success(hash)).unwrap();
        }

        assert_eq!(drain(&mut rx), vec![("reload".to_string(), "h2".to_string())]);
    }

    #[test]
    fn test_interactive_errors_deduplicated() {
        let (broadcaster, mut rx) = Broadcaster::detached();
        let (mut orchestrator, gate) = BuildOrchestrator::new(BuildMode::Development, broadcaster);

        orchestrator.consume(&failing("X")).unwrap();
        orchestrator.consume(&failing("X")).unwrap();
        orchestrator.consume(&failing("Y")).unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|(event, _)| event == "wait"));
        assert!(gate.outcome().is_none());
    }

    #[test]
    fn test_production_error_is_fatal_and_fails_gate() {
        let (broadcaster, mut rx) = Broadcaster::detached();
        let (mut orchestrator, gate) = BuildOrchestrator::new(BuildMode::Production, broadcaster);

        let text = "X\n    at compile (bundler.js:1:1)\n    at run (bundler.js:2:2)";
        let fatal = orchestrator.consume(&failing(text)).unwrap_err();

        assert_eq!(fatal.error, "X");
        assert_eq!(fatal.module.as_deref(), Some("src/sw.ts"));
        assert_eq!(gate.outcome(), Some(GateOutcome::Failed { error: "X".into() }));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_at_fatal() {
        let (broadcaster, _rx) = Broadcaster::detached();
        let (orchestrator, gate) = BuildOrchestrator::new(BuildMode::Production, broadcaster);
        let (tx, results) = mpsc::channel(4);

        tx.send(failing("X")).await.unwrap();
        tx.send(BuildResult::success("h1")).await.unwrap();

        let outcome = orchestrator.run(results).await;
        assert_eq!(outcome.unwrap_err().error, "X");
        assert_eq!(gate.wait().await, GateOutcome::Failed { error: "X".into() });
    }

    #[tokio::test]
    async fn test_run_completes_when_channel_closes() {
        let (broadcaster, mut rx) = Broadcaster::detached();
        let (orchestrator, gate) = BuildOrchestrator::new(BuildMode::Development, broadcaster);
        let (tx, results) = mpsc::channel(4);

        let task = tokio::spawn(orchestrator.run(results));
        tx.send(BuildResult::success("h1")).await.unwrap();
        assert_eq!(gate.wait().await, GateOutcome::Ready { hash: "h1".into() });

        tx.send(failing("boom")).await.unwrap();
        tx.send(BuildResult::success("h2")).await.unwrap();
        drop(tx);

        assert!(task.await.unwrap().is_ok());
        assert_eq!(
            drain(&mut rx),
            vec![
                ("wait".to_string(), "broken".to_string()),
                ("reload".to_string(), "h2".to_string()),
            ]
        );
    }

    #[test]
    fn test_production_changes_never_broadcast() {
        let (broadcaster, mut rx) = Broadcaster::detached();
        let (mut orchestrator, gate) = BuildOrchestrator::new(BuildMode::Production, broadcaster);

        orchestrator.consume(&BuildResult::success("h1")).unwrap();
        orchestrator.consume(&BuildResult::success("h2")).unwrap();

        assert!(drain(&mut rx).is_empty());
        assert_eq!(gate.outcome(), Some(GateOutcome::Ready { hash: "h1".into() }));
        assert_eq!(orchestrator.state().last_hash(), Some("h2"));
    }
}
