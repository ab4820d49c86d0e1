use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::warn;

use crate::checks::{CheckContext, CheckId, CheckOutcome, CheckSet};
use crate::criteria::{evaluate, CheckResult, RuleSet, Verdict};
use crate::data::{DataCube, FitsContainer, HeaderValue};
use crate::error::QcError;
use crate::plot::{self, SpectrumTrace};
use crate::report::ReportDocument;

const DEFAULT_DETECTOR_RULES: &str = include_str!("../../qc_params/check_detector.yml");
const DEFAULT_OBSERVATION_RULES: &str = include_str!("../../qc_params/check_observation.yml");

/// Cube extensions: flux, inverse variance, and the collapsed white image.
const FLUX_HDU: usize = 1;
const IVAR_HDU: usize = 2;
const WHITE_HDU: usize = 6;

/// Spaxel brightness percentiles sampled by the ranked-spectra check.
const SPECTRA_PERCENTILES: [usize; 6] = [50, 60, 70, 80, 90, 95];

/// Header cards shown next to the white-image display.
const WHITE_METADATA: [&str; 3] = ["CHIPNAME", "CRVAL1", "CRVAL2"];

/// QC checks for WEAVE LIFU datacubes.
#[derive(Debug)]
pub struct WeaveCubeChecks {
    container: FitsContainer,
    report: Option<ReportDocument>,
    outdir: PathBuf,
    params_dir: Option<PathBuf>,
}

impl WeaveCubeChecks {
    pub const CHECKS: &'static [CheckId] = &[
        CheckId::Detector,
        CheckId::Observation,
        CheckId::WhiteImage,
        CheckId::PctSpectra,
    ];

    pub fn new(input: &Path, ctx: CheckContext) -> Result<Self, QcError> {
        let container = FitsContainer::open(input)?;
        let report = ctx
            .html
            .then(|| ReportDocument::new(&report_title(&container)));
        Ok(WeaveCubeChecks {
            container,
            report,
            outdir: ctx.outdir,
            params_dir: ctx.params_dir,
        })
    }

    fn rules(&self, file_name: &str, embedded: &str) -> Result<RuleSet, QcError> {
        match &self.params_dir {
            Some(dir) => RuleSet::from_file(&dir.join(file_name)),
            None => RuleSet::from_yaml_str(embedded, Path::new(file_name)),
        }
    }

    fn header_check(
        &mut self,
        section_title: &str,
        rules: RuleSet,
    ) -> Result<CheckOutcome> {
        let observed = self.container.observed(0, &rules);
        let results = evaluate(&rules, &observed);
        warn_on_mismatches(&self.container.file_name(), &results);
        if let Some(report) = &mut self.report {
            report.add_table_section(
                section_title,
                results.iter().map(|r| r.to_row()).collect(),
            );
        }
        Ok(CheckOutcome::table(results))
    }

    fn check_detector(&mut self) -> Result<CheckOutcome> {
        let rules = self.rules("check_detector.yml", DEFAULT_DETECTOR_RULES)?;
        self.header_check("Detector checks", rules)
    }

    fn check_observation(&mut self) -> Result<CheckOutcome> {
        let rules = self.rules("check_observation.yml", DEFAULT_OBSERVATION_RULES)?;
        self.header_check("Observation checks", rules)
    }

    /// Display the collapsed white image with its identifying header cards.
    fn check_white_image(&mut self) -> Result<CheckOutcome> {
        let plane = self.container.image_plane(WHITE_HDU)?;
        let output = self.outdir.join("white_image.png");
        plot::save_png(&plot::plane_to_image(&plane, None), &output)?;

        let metadata: Vec<(String, String)> = WHITE_METADATA
            .iter()
            .map(|kw| {
                (
                    kw.to_string(),
                    self.container.header_value(WHITE_HDU, kw).to_string(),
                )
            })
            .collect();
        if let Some(report) = &mut self.report {
            report.add_metadata_section("White image metadata", &metadata);
            report.add_plot_section("White image", "white_image.png");
        }
        Ok(CheckOutcome::artifact(output))
    }

    /// Spectra of spaxels ranked by median flux, one panel per percentile,
    /// with the one-sigma band derived from the inverse-variance extension.
    fn check_pct_spectra(&mut self) -> Result<CheckOutcome> {
        let flux = self.container.cube(FLUX_HDU)?;
        let ivar = self.container.cube(IVAR_HDU)?;
        let wavelength = self.wavelength_axis(&flux);

        let rank = rank_spaxels_by_median(&flux);
        let mut traces = Vec::with_capacity(SPECTRA_PERCENTILES.len());
        for pct in SPECTRA_PERCENTILES {
            let pos = rank[(pct * rank.len() / 100).min(rank.len() - 1)];
            let (x, y) = (pos % flux.nx, pos / flux.nx);
            let spectrum = flux.spectrum(x, y);
            let sigma: Vec<f64> = ivar
                .spectrum(x, y)
                .iter()
                .map(|&w| {
                    if w.is_finite() && w > 0.0 {
                        1.0 / w.sqrt()
                    } else {
                        f64::NAN
                    }
                })
                .collect();
            traces.push(SpectrumTrace {
                label: format!("Rank {}", pct),
                wavelength: wavelength.clone(),
                flux: spectrum,
                sigma: Some(sigma),
            });
        }

        let output = self.outdir.join("pct_spectra.png");
        plot::save_png(&plot::render_spectra(&traces), &output)?;
        if let Some(report) = &mut self.report {
            report.add_plot_section("Ranked spectra", "pct_spectra.png");
        }
        Ok(CheckOutcome::artifact(output))
    }

    /// Wavelength of every bin along the spectral axis, in Angstrom, from
    /// the linear WCS of the flux extension (CRVAL3/CRPIX3/CD3_3 in
    /// metres). Falls back to bin indices when the WCS cards are absent.
    fn wavelength_axis(&self, cube: &DataCube) -> Vec<f64> {
        let card = |kw: &str| match self.container.header_value(FLUX_HDU, kw) {
            HeaderValue::Number(v) => Some(v),
            _ => None,
        };
        let crval = card("CRVAL3");
        let delta = card("CD3_3").or_else(|| card("CDELT3"));
        let crpix = card("CRPIX3").unwrap_or(1.0);
        match (crval, delta) {
            (Some(crval), Some(delta)) => (0..cube.nz)
                .map(|i| (crval + ((i + 1) as f64 - crpix) * delta) * 1e10)
                .collect(),
            _ => {
                warn!(
                    "{}: no spectral WCS in HDU {}, using bin indices",
                    self.container.file_name(),
                    FLUX_HDU
                );
                (0..cube.nz).map(|i| i as f64).collect()
            }
        }
    }
}

/// Spaxel indices sorted by ascending median flux over the spectral axis.
/// Spaxels with no finite samples sort as zero, matching how the white
/// image treats empty fibres.
fn rank_spaxels_by_median(cube: &DataCube) -> Vec<usize> {
    let mut medians = vec![0.0f64; cube.spaxels()];
    for y in 0..cube.ny {
        for x in 0..cube.nx {
            let m = plot::median_of(&cube.spectrum(x, y));
            if m.is_finite() {
                medians[x + y * cube.nx] = m;
            }
        }
    }
    let mut rank: Vec<usize> = (0..medians.len()).collect();
    rank.sort_by(|&a, &b| medians[a].partial_cmp(&medians[b]).unwrap());
    rank
}

fn warn_on_mismatches(file_name: &str, results: &[CheckResult]) {
    for result in results {
        if result.verdict == Verdict::Mismatch {
            warn!(
                "{}: value {} does not match the declared rule shape for {}",
                file_name, result.value, result.keyword
            );
        }
    }
}

fn report_title(container: &FitsContainer) -> String {
    format!("QC report of {} (weave)", container.file_name())
}

impl CheckSet for WeaveCubeChecks {
    fn title(&self) -> String {
        report_title(&self.container)
    }

    fn run(&mut self, check: CheckId) -> Result<CheckOutcome> {
        match check {
            CheckId::Detector => self.check_detector(),
            CheckId::Observation => self.check_observation(),
            CheckId::WhiteImage => self.check_white_image(),
            CheckId::PctSpectra => self.check_pct_spectra(),
            other => Err(QcError::Configuration(format!(
                "check '{}' is not part of the weave cube set",
                other
            ))
            .into()),
        }
    }

    fn into_report(self: Box<Self>) -> Option<ReportDocument> {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_spaxels_orders_by_median_flux() {
        // 3 spaxels in a row, 3 wavelength bins; spaxel 1 brightest
        let mut cube = DataCube {
            nx: 3,
            ny: 1,
            nz: 3,
            data: vec![0.0; 9],
        };
        for z in 0..3 {
            cube.data[z * 3] = 5.0;
            cube.data[1 + z * 3] = 9.0;
            cube.data[2 + z * 3] = 1.0;
        }
        assert_eq!(rank_spaxels_by_median(&cube), vec![2, 0, 1]);
    }

    #[test]
    fn test_rank_spaxels_treats_all_nan_as_zero() {
        let cube = DataCube {
            nx: 2,
            ny: 1,
            nz: 2,
            data: vec![f64::NAN, 3.0, f64::NAN, 3.0],
        };
        // spaxel 0 is all-NaN and must rank below the finite spaxel
        assert_eq!(rank_spaxels_by_median(&cube), vec![0, 1]);
    }
}
