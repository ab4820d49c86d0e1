use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while configuring or running a QC batch.
#[derive(Debug, Error)]
pub enum QcError {
    /// Requested survey/mode/check does not exist. Fatal for the whole run.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A data product could not be opened or read. Aborts that file only.
    #[error("cannot access {path}: {reason}")]
    DataAccess { path: PathBuf, reason: String },

    /// An acceptance-rule file is missing or malformed.
    #[error("bad rule file {path}: {reason}")]
    Params { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the report assembler.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report not found: {0}")]
    NotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_message() {
        let err = QcError::Configuration("survey 'sdss' not available".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: survey 'sdss' not available"
        );
    }

    #[test]
    fn test_data_access_error_message() {
        let err = QcError::DataAccess {
            path: PathBuf::from("/data/r1002345.fit"),
            reason: "no such file".to_string(),
        };
        assert!(err.to_string().contains("r1002345.fit"));
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn test_report_not_found_message() {
        let err = ReportError::NotFound(PathBuf::from("out/index.html"));
        assert!(err.to_string().contains("index.html"));
    }
}
