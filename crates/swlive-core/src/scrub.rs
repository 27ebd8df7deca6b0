//! Removal of bundler-internal noise from error text.
//!
//! Everything a human reads about a failed build goes through
//! [`scrub_error_text`] first. The scrubbed text is also what the
//! recompilation state compares to decide whether an error is new.

use once_cell::sync::Lazy;
use regex::Regex;

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static LOADER_BANNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^.*Module build failed.*$").unwrap());

// The first stack frame swallows everything after it.
static STACK_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*at\s[\s\S]+").unwrap());

/// Normalizes raw error text for display and de-duplication.
///
/// Collapses runs of blank lines, drops the loader's "Module build failed"
/// banner, cuts the text at the first stack frame (`    at foo (file:1:2)`)
/// and trims the result.
pub fn scrub_error_text(raw: &str) -> String {
    let text = BLANK_RUNS.replace_all(raw, "\n\n");
    let text = LOADER_BANNER.replace(&text, "");
    let text = STACK_TAIL.replace_all(&text, "");

    text.trim().to_string()
}
