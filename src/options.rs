use serde::Deserialize;
use thiserror::Error;

/// One account entry from the custom select's `options` attribute.
///
/// The dropdown is a custom element that carries its option list as an
/// HTML-escaped JSON attribute rather than as child `<option>` nodes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountOption {
    /// Display label, e.g. "Checking (...1234)".
    pub name: String,
    /// Opaque value used both to pick the option and to verify the pick.
    pub value: String,
    /// Position the widget reports for the option.
    pub index: i64,
}

#[derive(Debug, Clone, Error)]
#[error("malformed options attribute: {reason}")]
pub struct MalformedOptions {
    pub reason: String,
}

impl MalformedOptions {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Parse the dropdown's `options` attribute into account entries.
///
/// The attribute is JSON with `"` escaped as `&quot;`. Only that entity is
/// unescaped; the values themselves pass through untouched.
pub fn parse_account_options(attribute: &str) -> Result<Vec<AccountOption>, MalformedOptions> {
    let json = attribute.replace("&quot;", "\"");
    serde_json::from_str(&json).map_err(|err| MalformedOptions::new(err.to_string()))
}
