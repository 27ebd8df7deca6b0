//! The browser side of live reload.

use crate::sse::DEFAULT_PORT;

const CLIENT_TEMPLATE: &str = include_str!("../assets/client.js");
const PORT_PLACEHOLDER: &str = "__SWLIVE_PORT__";

/// Renders the browser client script for a server on `port`.
///
/// The script tracks every service worker registration made after it loads,
/// unregisters them all on `reload` and then reloads the page.
pub fn render_client_script(port: u16) -> String {
    CLIENT_TEMPLATE.replace(PORT_PLACEHOLDER, &port.to_string())
}

/// The client script for the default port.
pub fn default_client_script() -> String {
    render_client_script(DEFAULT_PORT)
}
