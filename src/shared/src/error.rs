use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Metrics unavailable: {0}")]
    MetricsUnavailable(String),

    #[error("Calculator error: {0}")]
    Calculator(String),

    #[error("Spawn error: {0}")]
    Spawn(String),

    #[error("Reap error: {0}")]
    Reap(String),

    #[error("Duplicate pid {0} in worker pool")]
    DuplicatePid(u32),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Infrastructure(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Infrastructure(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(format!("TOML deserialization error: {}", err))
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Configuration(format!("TOML serialization error: {}", err))
    }
}
