use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("subprocess error: {0}")]
    Subprocess(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WardenError>;
