use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("data root does not exist: {}", path.display())]
    MissingDataRoot { path: PathBuf },

    #[error("failed to bind to directory: {0}")]
    DirectoryBind(String),

    #[error("directory lookup failed for {id}: {message}")]
    Lookup { id: String, message: String },

    #[error("run cancelled by operator")]
    Cancelled,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("staging directory already exists: {}", path.display())]
    StagingExists { path: PathBuf },

    #[error("archive output already exists: {}", path.display())]
    ArtifactExists { path: PathBuf },

    #[error("path is not valid utf-8: {}", path.display())]
    NonUtf8Path { path: PathBuf },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl Error {
    /// Run-aborting conditions that must stop the run before any data moves.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MissingDataRoot { .. } | Error::DirectoryBind(_) | Error::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
