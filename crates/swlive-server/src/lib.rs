//! swlive server - live reload notifications for service worker development
//!
//! Browsers open a long-lived `text/event-stream` request against this
//! server. Whenever a rebuild changes the worker the server tells every
//! client to `reload`; while the build is broken it sends `wait` instead.
//!
//! The pieces:
//! - [`LiveReloadServer`] accepts clients and fans events out to them.
//! - [`ConnectionRegistry`] tracks open connections so they can all be torn
//!   down at once.
//! - [`TerminationHooks`] runs teardown on signals and on exit.
//! - [`BuildOrchestrator`] turns build results into events and opens the
//!   [`StartupGate`] once the first good build lands.

mod client;
mod connection;
mod gate;
mod orchestrator;
mod registry;
mod server;
mod sse;
mod termination;

pub use client::{default_client_script, render_client_script};
pub use connection::{SseConnection, TransportSocket, FRAME_QUEUE_CAPACITY};
pub use gate::{startup_gate, GateOutcome, GateTrigger, StartupGate};
pub use orchestrator::{BuildOrchestrator, FatalBuild};
pub use registry::{ConnectionId, ConnectionRegistry, Destroy, Registration};
pub use server::{
    Broadcaster, LiveReloadServer, Notification, ServerConfig, ServerError, ServerRegistry,
};
pub use sse::{
    encode_event, event_stream_response, format_address, DEFAULT_PORT, DEFAULT_RETRY_MS,
    KEEP_ALIVE_FRAME, UNKNOWN_ADDRESS,
};
pub use termination::{ExitGuard, TerminationCause, TerminationHooks, TERMINATION_SIGNALS};
