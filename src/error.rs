use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider responded with HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected payload: {0}")]
    Parse(String),

    #[error("Constraint violation while loading {table}: {message}")]
    Constraint { table: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid source parameters: {0}")]
    InvalidParams(String),
}

/// Coarse failure class, used for log fields and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Parse,
    Constraint,
    Storage,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Parse => "parse",
            ErrorKind::Constraint => "constraint",
            ErrorKind::Storage => "storage",
            ErrorKind::Config => "config",
        }
    }
}

impl EtlError {
    pub fn parse(message: impl Into<String>) -> Self {
        EtlError::Parse(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EtlError::Http(_) | EtlError::Status { .. } => ErrorKind::Transport,
            EtlError::Json(_) | EtlError::Parse(_) => ErrorKind::Parse,
            EtlError::Constraint { .. } => ErrorKind::Constraint,
            EtlError::Database(_) => ErrorKind::Storage,
            EtlError::Toml(_) | EtlError::Io(_) | EtlError::Config(_) | EtlError::InvalidParams(_) => {
                ErrorKind::Config
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
