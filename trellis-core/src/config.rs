//! Runtime configuration.

use serde::Deserialize;

/// Default bound on reaction runs per outermost transaction close.
pub const DEFAULT_MAX_FLUSH_ITERATIONS: usize = 10_000;

/// Tunables for a [`Runtime`](crate::Runtime).
///
/// Deserializable so an embedding application can keep it next to its own
/// settings; every field falls back to its default when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Label attached to log output of this runtime.
    pub name: String,

    /// Reaction runs allowed while draining one transaction before the
    /// engine gives up with [`ReactiveError::FlushLimitExceeded`](crate::ReactiveError).
    pub max_flush_iterations: usize,

    /// Forward `Read` records to the trace sink.
    pub trace_reads: bool,
}

impl RuntimeConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "trellis".to_string(),
            max_flush_iterations: DEFAULT_MAX_FLUSH_ITERATIONS,
            trace_reads: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{ "name": "editor" }"#).unwrap();
        assert_eq!(config.name, "editor");
        assert_eq!(config.max_flush_iterations, DEFAULT_MAX_FLUSH_ITERATIONS);
        assert!(!config.trace_reads);
    }

    #[test]
    fn full_config_round_trips_fields() {
        let config: RuntimeConfig = serde_json::from_str(
            r#"{ "name": "x", "max_flush_iterations": 5, "trace_reads": true }"#,
        )
        .unwrap();
        assert_eq!(config.max_flush_iterations, 5);
        assert!(config.trace_reads);
    }
}
