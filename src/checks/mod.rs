pub mod weave_cube;
pub mod weave_raw;

pub use weave_cube::WeaveCubeChecks;
pub use weave_raw::WeaveRawChecks;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

use crate::criteria::CheckResult;
use crate::error::QcError;
use crate::report::ReportDocument;

/// Data level of the inputs; selects the reader and the check set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QcMode {
    Raw,
    Cube,
    Prod,
}

impl fmt::Display for QcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QcMode::Raw => "raw",
            QcMode::Cube => "cube",
            QcMode::Prod => "prod",
        })
    }
}

/// Identifier for one named QC check. Unknown names fail here, at
/// configuration time, before any data file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckId {
    Primary,
    RawDisplay,
    Histogram,
    Detector,
    Observation,
    WhiteImage,
    PctSpectra,
}

impl CheckId {
    pub fn name(&self) -> &'static str {
        match self {
            CheckId::Primary => "check_primary",
            CheckId::RawDisplay => "check_raw",
            CheckId::Histogram => "check_histogram",
            CheckId::Detector => "check_detector",
            CheckId::Observation => "check_observation",
            CheckId::WhiteImage => "check_white_image",
            CheckId::PctSpectra => "check_pct_spectra",
        }
    }
}

impl FromStr for CheckId {
    type Err = QcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check_primary" => Ok(CheckId::Primary),
            "check_raw" => Ok(CheckId::RawDisplay),
            "check_histogram" => Ok(CheckId::Histogram),
            "check_detector" => Ok(CheckId::Detector),
            "check_observation" => Ok(CheckId::Observation),
            "check_white_image" => Ok(CheckId::WhiteImage),
            "check_pct_spectra" => Ok(CheckId::PctSpectra),
            other => Err(QcError::Configuration(format!(
                "unknown QC check '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What one executed check produced: a verdict table, an artifact on disk,
/// or both.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckOutcome {
    pub results: Vec<CheckResult>,
    pub artifact: Option<PathBuf>,
}

impl CheckOutcome {
    pub fn table(results: Vec<CheckResult>) -> Self {
        CheckOutcome {
            results,
            artifact: None,
        }
    }

    pub fn artifact(path: PathBuf) -> Self {
        CheckOutcome {
            results: Vec::new(),
            artifact: Some(path),
        }
    }
}

/// Per-file construction context shared by all check sets.
#[derive(Debug, Clone)]
pub struct CheckContext {
    /// Directory receiving the file's plot artifacts and report.
    pub outdir: PathBuf,
    /// Whether to accumulate an HTML report alongside the artifacts.
    pub html: bool,
    /// Optional override directory for acceptance-rule YAML files.
    pub params_dir: Option<PathBuf>,
}

/// A battery of checks bound to one opened data product. The set owns the
/// file handle and the per-file report for its lifetime; both are released
/// when the set is dropped or the report is taken.
pub trait CheckSet: std::fmt::Debug {
    /// Title used for the per-file report and the master index reference.
    fn title(&self) -> String;

    fn run(&mut self, check: CheckId) -> Result<CheckOutcome>;

    /// Hand the accumulated report back once all checks have run.
    fn into_report(self: Box<Self>) -> Option<ReportDocument>;
}

/// Checks available for a given survey and data level, without opening any
/// file. Unknown combinations are configuration errors.
pub fn supported_checks(survey: &str, mode: QcMode) -> Result<&'static [CheckId], QcError> {
    match (survey, mode) {
        ("weave", QcMode::Raw) => Ok(WeaveRawChecks::CHECKS),
        ("weave", QcMode::Cube) => Ok(WeaveCubeChecks::CHECKS),
        _ => Err(QcError::Configuration(format!(
            "no check set registered for survey '{}' at level '{}'",
            survey, mode
        ))),
    }
}

/// Build the check set for one input file. The registry replaces
/// string-based attribute lookup: every (survey, mode) pair maps to an
/// explicit constructor.
pub fn build_check_set(
    survey: &str,
    mode: QcMode,
    input: &Path,
    ctx: CheckContext,
) -> Result<Box<dyn CheckSet>, QcError> {
    match (survey, mode) {
        ("weave", QcMode::Raw) => Ok(Box::new(WeaveRawChecks::new(input, ctx)?)),
        ("weave", QcMode::Cube) => Ok(Box::new(WeaveCubeChecks::new(input, ctx)?)),
        _ => Err(QcError::Configuration(format!(
            "no check set registered for survey '{}' at level '{}'",
            survey, mode
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_id_round_trips_through_name() {
        for id in [
            CheckId::Primary,
            CheckId::RawDisplay,
            CheckId::Histogram,
            CheckId::Detector,
            CheckId::Observation,
            CheckId::WhiteImage,
            CheckId::PctSpectra,
        ] {
            assert_eq!(id.name().parse::<CheckId>().unwrap(), id);
        }
    }

    #[test]
    fn test_unknown_check_name_is_configuration_error() {
        let err = "check_bogus".parse::<CheckId>().unwrap_err();
        assert!(matches!(err, QcError::Configuration(_)));
        assert!(err.to_string().contains("check_bogus"));
    }

    #[test]
    fn test_registry_known_combinations() {
        let raw = supported_checks("weave", QcMode::Raw).unwrap();
        assert!(raw.contains(&CheckId::Primary));
        assert!(raw.contains(&CheckId::Histogram));
        let cube = supported_checks("weave", QcMode::Cube).unwrap();
        assert!(cube.contains(&CheckId::WhiteImage));
        assert!(!cube.contains(&CheckId::Primary));
    }

    #[test]
    fn test_registry_rejects_unknown_survey_and_prod_mode() {
        assert!(matches!(
            supported_checks("sdss", QcMode::Raw),
            Err(QcError::Configuration(_))
        ));
        // prod level exists on the CLI but has no registered check set
        assert!(matches!(
            supported_checks("weave", QcMode::Prod),
            Err(QcError::Configuration(_))
        ));
    }

    #[test]
    fn test_build_check_set_unknown_survey() {
        let ctx = CheckContext {
            outdir: PathBuf::from("/tmp"),
            html: false,
            params_dir: None,
        };
        let err = build_check_set("sdss", QcMode::Raw, Path::new("x.fit"), ctx).unwrap_err();
        assert!(matches!(err, QcError::Configuration(_)));
    }

    #[test]
    fn test_qc_mode_display() {
        assert_eq!(QcMode::Raw.to_string(), "raw");
        assert_eq!(QcMode::Cube.to_string(), "cube");
        assert_eq!(QcMode::Prod.to_string(), "prod");
    }
}
