//! The startup gate.
//!
//! The host's "done" step awaits [`StartupGate::wait`] so it never reports the
//! build as finished before the first decision about the worker was made.
//! The gate opens at most once, either ready (first good output) or failed
//! (fatal production error). A failed gate lets late awaiters see the failure
//! instead of hanging while the process shuts down.
//!
//! If the trigger is dropped without ever resolving (the build never produced
//! a result), waiters stay pending. There is no timeout; callers that need
//! one wrap `wait` themselves.

use tokio::sync::watch;

/// How the gate opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The first good build, with its output hash.
    Ready { hash: String },
    /// A fatal build error, scrubbed.
    Failed { error: String },
}

/// Creates a connected trigger and gate.
pub fn startup_gate() -> (GateTrigger, StartupGate) {
    let (tx, rx) = watch::channel(None);
    (GateTrigger { tx }, StartupGate { rx })
}

/// Resolves the gate. Only the first resolution counts.
#[derive(Debug)]
pub struct GateTrigger {
    tx: watch::Sender<Option<GateOutcome>>,
}

impl GateTrigger {
    /// Opens the gate as ready. Returns `false` if it was already resolved.
    pub fn release(&self, hash: impl Into<String>) -> bool {
        self.resolve(GateOutcome::Ready { hash: hash.into() })
    }

    /// Opens the gate as failed. Returns `false` if it was already resolved.
    pub fn fail(&self, error: impl Into<String>) -> bool {
        self.resolve(GateOutcome::Failed {
            error: error.into(),
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }

    fn resolve(&self, outcome: GateOutcome) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(outcome);
                true
            } else {
                false
            }
        })
    }
}

/// Awaitable side of the gate. Cheap to clone; every clone sees the same outcome.
#[derive(Debug, Clone)]
pub struct StartupGate {
    rx: watch::Receiver<Option<GateOutcome>>,
}

impl StartupGate {
    /// The outcome, if the gate already opened.
    pub fn outcome(&self) -> Option<GateOutcome> {
        self.rx.borrow().clone()
    }

    /// Waits for the gate to open.
    pub async fn wait(&self) -> GateOutcome {
        let mut rx = self.rx.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(outcome) = current {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Trigger dropped unresolved: the gate never opens.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_release_once() {
        let (trigger, gate) = startup_gate();
        assert!(gate.outcome().is_none());

        assert!(trigger.release("h1"));
        assert!(!trigger.release("h2"));
        assert!(!trigger.fail("late"));

        assert_eq!(gate.wait().await, GateOutcome::Ready { hash: "h1".into() });
        assert_eq!(gate.clone().wait().await, GateOutcome::Ready { hash: "h1".into() });
    }

    #[tokio::test]
    async fn test_waiters_wake_on_release() {
        let (trigger, gate) = startup_gate();
        let waiter = tokio::spawn(async move { gate.wait().await });

        tokio::task::yield_now().await;
        trigger.fail("X");

        assert_eq!(
            waiter.await.unwrap(),
            GateOutcome::Failed { error: "X".into() }
        );
    }

    #[tokio::test]
    async fn test_dropped_trigger_keeps_gate_pending() {
        let (trigger, gate) = startup_gate();
        drop(trigger);

        let waited = tokio::time::timeout(Duration::from_millis(50), gate.wait()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_resolved_before_drop_is_still_visible() {
        let (trigger, gate) = startup_gate();
        trigger.release("h1");
        drop(trigger);

        assert_eq!(gate.wait().await, GateOutcome::Ready { hash: "h1".into() });
    }
}
