use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpacecatError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SpacecatError {
    /// Short error code string, stable across releases for log filtering.
    pub fn code(&self) -> &'static str {
        match self {
            SpacecatError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SpacecatError>;
