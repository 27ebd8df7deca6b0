//! Event-stream wire format.
//!
//! ```text
//! retry: 1000
//! event: reload
//! data: 3f2a...
//!
//! ```

use hyper::header::{
    HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONNECTION, CONTENT_TYPE,
};
use hyper::Response;
use std::net::SocketAddr;

/// Port used when none (or an invalid one) is configured.
pub const DEFAULT_PORT: u16 = 4000;

/// Reconnect hint sent with every event, in milliseconds.
pub const DEFAULT_RETRY_MS: u64 = 1000;

/// Comment-only record written right after the handshake.
pub const KEEP_ALIVE_FRAME: &str = ":ok\n\n";

/// Shown when the bound address cannot be determined.
pub const UNKNOWN_ADDRESS: &str = "<unknown address>";

/// Wraps `body` in the never-ending `200 OK` event-stream response.
pub fn event_stream_response<B>(body: B) -> Response<B> {
    let mut response = Response::new(body);
    let headers = response.headers_mut();

    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store, no-transform"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(HeaderName::from_static("keep-alive"), HeaderValue::from_static("timeout=0"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

    response
}

/// Encodes one event record.
///
/// Multi-line payloads become several `data:` lines, which clients join
/// back with `\n`.
pub fn encode_event(retry_ms: u64, event: &str, payload: &str) -> String {
    let event: String = event.chars().filter(|c| *c != '\r' && *c != '\n').collect();

    let mut frame = format!("retry: {}\nevent: {}\n", retry_ms, event);
    for line in payload.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line.trim_end_matches('\r'));
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

/// Human-readable form of a bound address.
pub fn format_address(addr: Option<SocketAddr>) -> String {
    match addr {
        Some(SocketAddr::V4(v4)) => format!("{}:{}", v4.ip(), v4.port()),
        Some(SocketAddr::V6(v6)) => format!("[{}]:{}", v6.ip(), v6.port()),
        None => UNKNOWN_ADDRESS.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV6};

    #[test]
    fn test_encode_event() {
        assert_eq!(
            encode_event(1000, "reload", "abc123"),
            "retry: 1000\nevent: reload\ndata: abc123\n\n"
        );
    }

    #[test]
    fn test_encode_event_multiline_payload() {
        assert_eq!(
            encode_event(500, "wait", "a\r\nb"),
            "retry: 500\nevent: wait\ndata: a\ndata: b\n\n"
        );
    }

    #[test]
    fn test_encode_event_strips_newlines_from_name() {
        assert!(encode_event(1, "re\nload", "x").contains("event: reload\n"));
    }

    #[test]
    fn test_event_stream_response_headers() {
        let response = event_stream_response(());
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        assert_eq!(response.status(), hyper::StatusCode::OK);
        assert_eq!(header("content-type").as_deref(), Some("text/event-stream"));
        assert_eq!(header("cache-control").as_deref(), Some("no-store, no-transform"));
        assert_eq!(header("connection").as_deref(), Some("keep-alive"));
        assert_eq!(header("keep-alive").as_deref(), Some("timeout=0"));
        assert_eq!(header("access-control-allow-origin").as_deref(), Some("*"));
    }

    #[test]
    fn test_format_address() {
        let v4 = SocketAddr::from((Ipv4Addr::LOCALHOST, 4000));
        let v6 = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 4000, 0, 0));

        assert_eq!(format_address(Some(v4)), "127.0.0.1:4000");
        assert_eq!(format_address(Some(v6)), "[::1]:4000");
        assert_eq!(format_address(None), UNKNOWN_ADDRESS);
    }
}
