use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read sources file {path}: {source}")]
    SourcesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sources file: {0}")]
    SourcesFileParse(#[from] serde_yaml::Error),

    #[error("invalid sources config: {0}")]
    Validation(String),

    #[error("unknown source \"{0}\"")]
    UnknownSource(String),

    #[error("unknown roaster \"{0}\"")]
    UnknownRoaster(String),

    #[error("credential env var {var} for source \"{source_id}\" is not set")]
    MissingCredential { source_id: String, var: String },
}
