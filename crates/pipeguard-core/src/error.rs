use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipeguardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("{code}: {message}")]
    State { code: &'static str, message: String },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl PipeguardError {
    /// State failures carry a machine-stable reason code next to the
    /// human-readable message.
    pub fn state(code: &'static str, message: impl Into<String>) -> Self {
        Self::State {
            code,
            message: message.into(),
        }
    }

    pub fn reason_code(&self) -> &str {
        match self {
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Yaml(_) => "yaml",
            Self::Input(_) => "invalid_input",
            Self::Resource(_) => "resource",
            Self::State { code, .. } => code,
            Self::Runtime(_) => "runtime",
            Self::Timeout(_) => "timeout",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Parse(_) => "parse",
            Self::Configuration(_) => "configuration",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipeguardError>;
