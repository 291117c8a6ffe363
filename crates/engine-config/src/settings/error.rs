use thiserror::Error;

/// Errors raised when loading or validating importer settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A numeric setting that must be positive was zero.
    #[error("Setting '{0}' must be greater than zero")]
    NotPositive(&'static str),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read settings file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
