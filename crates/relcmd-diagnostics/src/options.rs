//! Diagnostics configuration.

use relcmd_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Switches controlling which command events are raised and how much they
/// reveal.
///
/// Missing fields take their default when deserialized, so a partial JSON
/// document such as `{"sensitive_data_logging": true}` is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsOptions {
    /// Raise command-creating / command-created events.
    pub command_create_events: bool,
    /// Raise executing / executed / error events.
    pub command_execute_events: bool,
    /// Include parameter values in log output.
    pub sensitive_data_logging: bool,
    /// Name the offending column in buffered reader errors.
    pub detailed_errors: bool,
}

impl Default for DiagnosticsOptions {
    fn default() -> Self {
        Self {
            command_create_events: true,
            command_execute_events: true,
            sensitive_data_logging: false,
            detailed_errors: false,
        }
    }
}

impl DiagnosticsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Custom(format!("invalid diagnostics options: {e}")))
    }

    pub fn command_create_events(mut self, enabled: bool) -> Self {
        self.command_create_events = enabled;
        self
    }

    pub fn command_execute_events(mut self, enabled: bool) -> Self {
        self.command_execute_events = enabled;
        self
    }

    pub fn sensitive_data_logging(mut self, enabled: bool) -> Self {
        self.sensitive_data_logging = enabled;
        self
    }

    pub fn detailed_errors(mut self, enabled: bool) -> Self {
        self.detailed_errors = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DiagnosticsOptions::default();
        assert!(options.command_create_events);
        assert!(options.command_execute_events);
        assert!(!options.sensitive_data_logging);
        assert!(!options.detailed_errors);
    }

    #[test]
    fn test_partial_json() {
        let options =
            DiagnosticsOptions::from_json(r#"{"sensitive_data_logging": true}"#).unwrap();
        assert!(options.sensitive_data_logging);
        assert!(options.command_execute_events);
    }

    #[test]
    fn test_invalid_json() {
        let err = DiagnosticsOptions::from_json("{not json").unwrap_err();
        assert!(err.to_string().starts_with("invalid diagnostics options"));
    }

    #[test]
    fn test_builder() {
        let options = DiagnosticsOptions::new()
            .command_create_events(false)
            .detailed_errors(true);
        assert!(!options.command_create_events);
        assert!(options.detailed_errors);
    }
}
