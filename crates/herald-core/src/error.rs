use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown post status: {0}")]
    InvalidStatus(String),

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),
}

impl HeraldError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            HeraldError::Config(_) => "CONFIG_ERROR",
            HeraldError::InvalidStatus(_) => "INVALID_STATUS",
            HeraldError::UnknownPlatform(_) => "UNKNOWN_PLATFORM",
        }
    }
}

pub type Result<T> = std::result::Result<T, HeraldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_code() {
        assert_eq!(HeraldError::Config("x".into()).code(), "CONFIG_ERROR");
        assert_eq!(HeraldError::InvalidStatus("x".into()).code(), "INVALID_STATUS");
        assert_eq!(HeraldError::UnknownPlatform("x".into()).code(), "UNKNOWN_PLATFORM");
    }
}
