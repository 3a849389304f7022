//! Enumerations selected through configuration.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// How scan requests reach the analysis engine.
///
/// `Session` keeps one authenticated engine process alive and reuses it across
/// requests. When that process degrades the orchestrator falls back to
/// spawning a fresh engine per request.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ExecutionMode {
    /// Spawn one engine process per request.
    #[default]
    OneShot,
    /// Route requests through a persistent engine session.
    Session,
}

/// Errors encountered while parsing a [`LogFormat`] or [`ExecutionMode`].
pub type ModeParseError = strum::ParseError;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("one_shot", ExecutionMode::OneShot)]
    #[case("SESSION", ExecutionMode::Session)]
    fn parses_execution_mode(#[case] raw: &str, #[case] expected: ExecutionMode) {
        let parsed: ExecutionMode = raw.parse().expect("mode should parse");
        assert_eq!(parsed, expected);
    }

    #[rstest]
    fn rejects_unknown_execution_mode() {
        let result = "daemon".parse::<ExecutionMode>();
        assert!(result.is_err());
    }

    #[rstest]
    fn log_format_displays_snake_case() {
        assert_eq!(LogFormat::Compact.to_string(), "compact");
        assert_eq!(LogFormat::default(), LogFormat::Json);
    }
}
