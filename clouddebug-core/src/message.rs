//! User-facing text for server status messages
//!
//! Server diagnostics arrive as positional templates (`$0`, `$1`, ...) plus a
//! parameter list. Rendering never fails: markers without a parameter stay literal.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::types::StatusMessage;

/// Fallback when the server flags an error without a readable description.
pub const GENERIC_ERROR: &str = "Something went wrong while processing the breakpoint";
/// Shown next to a breakpoint whose registration failed.
pub const ERROR_SET: &str = "Could not set the breakpoint on the server";
/// Registration returned nothing usable.
pub const NO_RESPONSE: &str = "The debugger service did not return a breakpoint";
/// No credentials for the configured user.
pub const BAD_LOGIN: &str = "You are not logged in as the user configured for this session";
/// A breakpoint of the wrong kind reached the registration path.
pub const INVALID_STATE: &str = "The breakpoint is not a cloud snapshot location";

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\$(\d+)").expect("static regex"))
}

/// Substitute `$N` markers in `format` with `parameters[N]`.
pub fn render_template(format: &str, parameters: &[String]) -> String {
    marker_regex()
        .replace_all(format, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|index| parameters.get(index))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Render a status description. `None` when there is no status or no description.
pub fn render_user_message(status: Option<&StatusMessage>) -> Option<String> {
    let description = status?.description.as_ref()?;
    let format = description.format.as_deref().unwrap_or_default();
    Some(render_template(format, &description.parameters))
}

/// Render an error status. `None` unless `is_error` is set; empty text falls back to [`GENERIC_ERROR`].
pub fn render_user_error_message(status: Option<&StatusMessage>) -> Option<String> {
    let status = status.filter(|s| s.is_error)?;
    match render_user_message(Some(status)) {
        Some(message) if !message.is_empty() => Some(message),
        _ => Some(GENERIC_ERROR.to_string()),
    }
}
