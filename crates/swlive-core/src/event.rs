//! Events pushed to connected browsers.

use serde::Serialize;

/// A named event delivered over the live reload stream.
///
/// The payload is always the content hash of the build that produced the
/// event; clients treat it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "hash", rename_all = "lowercase")]
pub enum LiveEvent {
    /// New output is available; clients drop their worker registrations and reload.
    Reload(String),
    /// The build has errors; clients must not reload yet.
    Wait(String),
}

impl LiveEvent {
    /// Event name as written on the `event:` line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reload(_) => "reload",
            Self::Wait(_) => "wait",
        }
    }

    /// Event payload as written on the `data:` line.
    pub fn payload(&self) -> &str {
        match self {
            Self::Reload(hash) | Self::Wait(hash) => hash,
        }
    }
}

impl std::fmt::Display for LiveEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(LiveEvent::Reload("a".into()).name(), "reload");
        assert_eq!(LiveEvent::Wait("a".into()).name(), "wait");
        assert_eq!(LiveEvent::Wait("abc".into()).payload(), "abc");
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&LiveEvent::Reload("f00d".into())).unwrap();
        assert_eq!(json, r#"{"event":"reload","hash":"f00d"}"#);
    }
}
