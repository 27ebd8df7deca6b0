//! Process termination hooks.
//!
//! [`TerminationHooks`] is created once at startup and handed to whoever owns
//! resources that must be released on the way out. Each armed handler runs
//! at most once, whichever comes first: a termination signal, an explicit
//! [`TerminationHooks::fire`], or the [`ExitGuard`] being dropped when `main`
//! returns.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Signals that fire the hooks: parent-side closes first, then self closes.
pub const TERMINATION_SIGNALS: &[&str] =
    &["SIGHUP", "SIGPIPE", "SIGUSR2", "SIGINT", "SIGQUIT", "SIGTERM"];

/// Why the hooks fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// A termination signal, by name.
    Signal(&'static str),
    /// Normal process exit.
    Exit,
}

impl std::fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal(name) => write!(f, "{}", name),
            Self::Exit => write!(f, "exit"),
        }
    }
}

type Handler = Box<dyn FnOnce() + Send>;

struct Armed {
    handler: Mutex<Option<Handler>>,
}

impl Armed {
    fn fire(&self) {
        let handler = self.handler.lock().take();
        if let Some(handler) = handler {
            handler();
        }
    }
}

struct Hooks {
    armed: Mutex<Vec<Arc<Armed>>>,
    cause: watch::Sender<Option<TerminationCause>>,
}

/// An explicit, shareable registry of shutdown handlers.
#[derive(Clone)]
pub struct TerminationHooks {
    inner: Arc<Hooks>,
}

impl Default for TerminationHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminationHooks {
    pub fn new() -> Self {
        let (cause, _) = watch::channel(None);

        Self {
            inner: Arc::new(Hooks {
                armed: Mutex::new(Vec::new()),
                cause,
            }),
        }
    }

    /// Arms `handler` to run once on termination.
    ///
    /// Handlers armed by different callers are independent. Arming after the
    /// hooks already fired runs the handler immediately.
    pub fn terminate_with<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let armed = Arc::new(Armed {
            handler: Mutex::new(Some(Box::new(handler))),
        });
        self.inner.armed.lock().push(Arc::clone(&armed));

        if self.cause().is_some() {
            armed.fire();
        }
    }

    /// Runs every armed handler that has not run yet.
    ///
    /// The first cause wins; later calls only pick up handlers armed since.
    pub fn fire(&self, cause: TerminationCause) {
        let first = self.inner.cause.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(cause);
                true
            } else {
                false
            }
        });
        if first {
            debug!(?cause, "Running termination hooks");
        }

        let armed: Vec<_> = self.inner.armed.lock().clone();
        for hook in armed {
            hook.fire();
        }
    }

    /// The cause the hooks fired with, if they fired.
    pub fn cause(&self) -> Option<TerminationCause> {
        *self.inner.cause.borrow()
    }

    /// Waits until the hooks fire.
    pub async fn terminated(&self) -> TerminationCause {
        let mut rx = self.inner.cause.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if let Some(cause) = current {
                return cause;
            }
            // The sender lives in `self`, so this only fails if it is dropped mid-wait.
            if rx.changed().await.is_err() {
                return TerminationCause::Exit;
            }
        }
    }

    /// Returns a guard that fires the hooks with [`TerminationCause::Exit`] when dropped.
    pub fn exit_guard(&self) -> ExitGuard {
        ExitGuard {
            hooks: self.clone(),
        }
    }

    /// Fires the hooks on the first of [`TERMINATION_SIGNALS`].
    #[cfg(unix)]
    pub fn listen_for_signals(&self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let kinds = [
            SignalKind::hangup(),
            SignalKind::pipe(),
            SignalKind::user_defined2(),
            SignalKind::interrupt(),
            SignalKind::quit(),
            SignalKind::terminate(),
        ];

        for (name, kind) in TERMINATION_SIGNALS.iter().copied().zip(kinds) {
            let mut stream = signal(kind)?;
            let hooks = self.clone();
            tokio::spawn(async move {
                if stream.recv().await.is_some() {
                    info!("Received {}", name);
                    hooks.fire(TerminationCause::Signal(name));
                }
            });
        }

        Ok(())
    }

    /// Fires the hooks on Ctrl+C.
    #[cfg(not(unix))]
    pub fn listen_for_signals(&self) -> std::io::Result<()> {
        let hooks = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C");
                hooks.fire(TerminationCause::Signal("SIGINT"));
            }
        });
        Ok(())
    }
}

/// Fires the hooks with [`TerminationCause::Exit`] on drop.
pub struct ExitGuard {
    hooks: TerminationHooks,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.hooks.fire(TerminationCause::Exit);
    }
}
