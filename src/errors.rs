//! Error types for the `swesmith` crate.
//!
//! This module defines a unified error enumeration used across profile loading,
//! environment building, bug generation, validation, and dataset assembly. It
//! integrates with `thiserror` to provide rich `Display` implementations and
//! error source chaining where applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - Variants are grouped by the error kinds the pipeline distinguishes:
//!   configuration, transport, parse, apply, harness, proxy/bridge, and schema.
//!   The grouping drives the exit codes documented in the CLI surface.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the `swesmith` library.
///
/// - Used across the profile registry, environment builder, bug generators,
///   validator, gatherer, issue generator, assembler, and distiller.
/// - Implements `std::error::Error` via `thiserror`.
pub enum SmithError {
    /// A profile is missing a required field or fails to parse.
    #[error("invalid profile `{0}`: {1}")]
    InvalidProfile(String, String),

    /// A required environment variable is absent or malformed.
    #[error("missing or invalid configuration: {0}")]
    Configuration(String),

    /// `git`/`docker`/LLM HTTP transport failed after exhausting retries.
    #[error("transport error talking to {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The proxy or container bridge is unreachable; operator action required.
    #[error("bridge unreachable: {0}")]
    BridgeUnreachable(String),

    /// A test-report log could not be classified above the noise threshold.
    #[error("unparseable test report ({unclassified}/{total} lines unclassified)")]
    UnparseableReport { unclassified: usize, total: usize },

    /// A candidate patch failed to apply cleanly to the working tree.
    #[error("patch `{0}` failed to apply: {1}")]
    ApplyFailed(String, String),

    /// The test harness itself crashed without producing any parseable result.
    #[error("test harness crashed (exit {0}): {1}")]
    HarnessCrash(i32, String),

    /// The LLM returned content that failed post-condition checks.
    #[error("LLM content rejected: {0}")]
    ContentRejected(String),

    /// A generated dataset record violates the canonical schema.
    #[error("schema violation: {0}")]
    Schema(String),

    /// No predictions/trajectories were available to distill.
    #[error("no predictions produced")]
    NoPredictions,

    /// Entity extraction could not round-trip a source file byte-for-byte.
    #[error("entity extraction failed for `{0}`: {1}")]
    EntityExtraction(String, String),

    /// I/O error from the filesystem, subprocess pipes, or streams.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML profile/config document failed to parse.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic custom error for miscellaneous failures.
    #[error("{0}")]
    Custom(String),
}

impl SmithError {
    /// Maps this error onto the exit-code taxonomy from the CLI surface.
    pub fn exit_code(&self) -> i32 {
        match self {
            SmithError::InvalidProfile(..) | SmithError::Configuration(_) | SmithError::Toml(_) => 1,
            SmithError::Transport { .. } => 2,
            SmithError::BridgeUnreachable(_) => 3,
            SmithError::NoPredictions => 4,
            SmithError::Schema(_)
            | SmithError::UnparseableReport { .. }
            | SmithError::ApplyFailed(..)
            | SmithError::HarnessCrash(..)
            | SmithError::ContentRejected(_)
            | SmithError::EntityExtraction(..)
            | SmithError::Io(_)
            | SmithError::Json(_)
            | SmithError::Custom(_) => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_maps_to_exit_code_one() {
        let e = SmithError::Configuration("GITHUB_TOKEN not set".into());
        assert_eq!(e.exit_code(), 1);
    }

    #[test]
    fn bridge_unreachable_maps_to_exit_code_three() {
        let e = SmithError::BridgeUnreachable("docker daemon socket".into());
        assert_eq!(e.exit_code(), 3);
    }

    #[test]
    fn no_predictions_maps_to_exit_code_four() {
        assert_eq!(SmithError::NoPredictions.exit_code(), 4);
    }
}
