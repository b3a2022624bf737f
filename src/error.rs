//! Error taxonomy shared by every marketplace service
use tracing::{debug, error};

/// Coarse classification of a [`MarketError`], used by callers to map a
/// rejection onto a response without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidOperation,
    InvalidQuantity,
    NoMatch,
    Unauthorized,
    StorageFailure,
}

#[derive(thiserror::Error, Debug)]
pub enum MarketError {
    #[error("product not found: {0}")]
    ProductNotFound(String),
    #[error("product already exists: {0}")]
    ProductAlreadyExists(String),
    #[error("no {collection} record matches the lookup")]
    NotFound { collection: &'static str },
    #[error("a {collection} record with the same key already exists")]
    AlreadyExists { collection: &'static str },
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("invalid quantity {requested} for product {product}")]
    InvalidQuantity { product: String, requested: i64 },
    #[error("matching {collection} records not found")]
    NoMatch { collection: &'static str },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("record codec failure: {0}")]
    Codec(String),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::ProductNotFound(_) | MarketError::NotFound { .. } => ErrorKind::NotFound,
            MarketError::ProductAlreadyExists(_) | MarketError::AlreadyExists { .. } => {
                ErrorKind::AlreadyExists
            }
            MarketError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            MarketError::InvalidQuantity { .. } => ErrorKind::InvalidQuantity,
            MarketError::NoMatch { .. } => ErrorKind::NoMatch,
            MarketError::Unauthorized(_) => ErrorKind::Unauthorized,
            MarketError::Storage(_) | MarketError::Codec(_) | MarketError::Config(_) => {
                ErrorKind::StorageFailure
            }
        }
    }

    /// True for rejections the caller caused and can correct.
    pub fn is_business_rule(&self) -> bool {
        self.kind() != ErrorKind::StorageFailure
    }

    /// Text safe to hand back to a caller. Storage failures collapse into a
    /// generic message so internal detail never leaves the process.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::StorageFailure => "internal storage failure".to_string(),
            _ => self.to_string(),
        }
    }

    pub(crate) fn codec(err: impl std::fmt::Display) -> Self {
        MarketError::Codec(err.to_string())
    }

    pub(crate) fn invalid_quantity(product: impl Into<String>, requested: i64) -> Self {
        MarketError::InvalidQuantity {
            product: product.into(),
            requested,
        }
    }
}

pub type Result<T, E = MarketError> = std::result::Result<T, E>;

/// Logs a failed service call on its way out: storage failures at `error`,
/// business-rule rejections at `debug`.
pub(crate) trait LogFailure {
    fn log_failure(self, operation: &'static str) -> Self;
}

impl<T> LogFailure for Result<T> {
    fn log_failure(self, operation: &'static str) -> Self {
        if let Err(err) = &self {
            if err.is_business_rule() {
                debug!(operation, error = %err, "request rejected");
            } else {
                error!(operation, error = %err, "storage failure");
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_errors_classify_with_generic_kinds() {
        assert_eq!(
            MarketError::ProductNotFound("Ghost".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            MarketError::ProductAlreadyExists("Handle".into()).kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            MarketError::invalid_quantity("Handle", -100).kind(),
            ErrorKind::InvalidQuantity
        );
    }

    #[test]
    fn storage_failures_hide_detail() {
        let err = MarketError::codec("unexpected type at position 3");
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
        assert!(!err.is_business_rule());
        assert_eq!(err.public_message(), "internal storage failure");

        let err = MarketError::ProductNotFound("Ghost".into());
        assert!(err.is_business_rule());
        assert_eq!(err.public_message(), "product not found: Ghost");
    }
}
