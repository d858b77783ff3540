//! Error types for library-dedup.
//!
//! Only bad configuration and an unreachable cache surface as errors. Sparse
//! or malformed input is absorbed by the detectors and shows up as empty
//! results instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DedupError {
    /// A threshold or TTL outside its documented range
    #[error("Invalid configuration: {parameter} = {value} ({reason})")]
    InvalidConfiguration {
        parameter: &'static str,
        value: String,
        reason: &'static str,
    },

    /// The durable cache could not be read or written.
    /// Callers should treat the cache as empty/invalid and carry on.
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Config file present but unreadable or malformed
    #[error("Config file error: {0}")]
    ConfigFile(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for DedupError {
    fn from(err: rusqlite::Error) -> Self {
        DedupError::CacheUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DedupError>;

/// Check an integer percentage threshold.
pub(crate) fn check_percent(parameter: &'static str, value: u32) -> Result<()> {
    if value > 100 {
        return Err(DedupError::InvalidConfiguration {
            parameter,
            value: value.to_string(),
            reason: "must be between 0 and 100",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_percent_bounds() {
        assert!(check_percent("similarity_threshold", 0).is_ok());
        assert!(check_percent("similarity_threshold", 100).is_ok());
        let err = check_percent("similarity_threshold", 101).unwrap_err();
        assert!(err.to_string().contains("similarity_threshold"));
        assert!(err.to_string().contains("101"));
    }

    #[test]
    fn test_sqlite_error_maps_to_cache_unavailable() {
        let err: DedupError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, DedupError::CacheUnavailable(_)));
    }
}
