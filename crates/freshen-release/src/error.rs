use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("release query to {source_name} failed: {message}")]
    Transport { source_name: String, message: String },
    #[error("no published release found at {source_name}")]
    NotFound { source_name: String },
    #[error("malformed release response from {source_name}: {message}")]
    Parse { source_name: String, message: String },
}

impl ReleaseError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::NotFound { .. } => "not-found",
            Self::Parse { .. } => "parse",
        }
    }
}
