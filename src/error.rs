use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Challenge not found: {namespace}/{name}")]
    ChallengeNotFound { namespace: String, name: String },

    #[error("Template rendering error: {0}")]
    TemplateError(#[from] minijinja::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Object is missing required metadata: {0}")]
    MissingMetadata(&'static str),
}

impl Error {
    /// Determine if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::KubeError(_))
    }
}
