use std::path::PathBuf;

/// An error from configuring or sequencing a SweepSense run.
///
/// None of these are retried by this crate. A failure part way through a
/// calibration sequence or a combination pass leaves the files produced by
/// earlier steps on disk.
///
/// - `Configuration` means the requested parameters can't be turned into a
///   sweep: the step size has no calibration data, no bands are selected, the
///   filename list is too short for the mode, or a manifest is malformed.
/// - `UnsupportedMode` is raised before any hardware handle is requested.
/// - `UnknownHardware` means the daughterboard is neither an SBX nor a CBX, so
///   there's no register map to program.
/// - `Deserialization` covers a missing, truncated, or incompatible persisted
///   configuration.
/// - `ExternalRuntime` is anything reported by the streaming runtime or the
///   device driver, including a missing flush acknowledgment.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Underlying OS I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// The configuration can't be resolved or used as given.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The mode code isn't one of the known topologies.
    #[error("Unsupported mode {0} (known modes: 0, 1, 2, 3, 10, 30)")]
    UnsupportedMode(i32),

    /// The installed daughterboard isn't an SBX or a CBX.
    #[error("Unknown daughterboard: {0:?}")]
    UnknownHardware(String),

    /// A persisted configuration couldn't be read back.
    #[error("Couldn't load configuration from {}", .path.display())]
    #[allow(missing_docs)]
    Deserialization {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A configuration couldn't be encoded for saving.
    #[error("Couldn't encode configuration")]
    Serialization(#[from] toml::ser::Error),

    /// A flowgraph connection is invalid: missing block, port out of range,
    /// mismatched item types, or an input connected twice.
    #[error("Invalid topology: {0}")]
    Topology(String),

    /// The streaming runtime or device driver failed.
    #[error("External runtime error: {0}")]
    ExternalRuntime(String),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn deserialization(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Deserialization {
            path: path.into(),
            source: source.into(),
        }
    }
}
