use thiserror::Error;

/// Error type shared by the market-data pipeline, the services and the stores.
///
/// The variants are deliberately coarse: callers branch on the kind of failure
/// (retry a transient error, report a conflict, reject bad input) rather than
/// on its message.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarketError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream unavailable: {0}")]
    TransientUpstream(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Already exists: {0}")]
    Conflict(String),
}

impl MarketError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MarketError::TransientUpstream(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MarketError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, MarketError::Conflict(_))
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, MarketError::InvalidInput(_))
    }
}

impl From<reqwest::Error> for MarketError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MarketError::TransientUpstream(format!("request timed out: {e}"))
        } else {
            MarketError::TransientUpstream(e.to_string())
        }
    }
}

impl From<fjall::Error> for MarketError {
    fn from(e: fjall::Error) -> Self {
        MarketError::Persistence(e.to_string())
    }
}

pub type Result<T, E = MarketError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinguishable() {
        assert!(MarketError::TransientUpstream("x".into()).is_transient());
        assert!(MarketError::NotFound("x".into()).is_not_found());
        assert!(MarketError::Conflict("x".into()).is_conflict());
        assert!(MarketError::InvalidInput("x".into()).is_invalid_input());
        assert!(!MarketError::Persistence("x".into()).is_conflict());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            MarketError::InvalidInput("symbol is required".into()).to_string(),
            "Invalid input: symbol is required"
        );
        assert_eq!(
            MarketError::Conflict("AAPL is already in the watchlist".into()).to_string(),
            "Already exists: AAPL is already in the watchlist"
        );
    }
}
