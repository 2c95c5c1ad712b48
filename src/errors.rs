use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No valid backup endpoints specified")]
    Resolution,

    #[error("Database connectivity check failed: {0}")]
    Connectivity(String),

    #[error("Command `{command}` exited with status {status}:\n{output}")]
    Subprocess {
        command: String,
        status: i32,
        output: String,
    },

    /// The backup ran but printed no `Finished artifact creation` marker.
    #[error("Cannot retrieve backup file name: {0}")]
    ArtifactParse(String),

    #[error("Cannot retrieve aggregated backup chain: {0}")]
    AggregateParse(String),

    #[error("Storage access check failed for {target}: {reason}")]
    StorageAccess { target: String, reason: String },

    #[error("Upload of {file} to {target} failed: {reason}")]
    Upload {
        file: String,
        target: String,
        reason: String,
    },

    #[error("Failed to delete {path}: {source}")]
    Cleanup {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
