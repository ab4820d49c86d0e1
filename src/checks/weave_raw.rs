use std::path::{Path, PathBuf};

use anyhow::Result;
use rand::Rng;
use tracing::{info, warn};

use crate::checks::{CheckContext, CheckId, CheckOutcome, CheckSet};
use crate::criteria::{evaluate, RuleSet, Verdict};
use crate::data::{FitsContainer, ImagePlane};
use crate::error::QcError;
use crate::plot::{self, CutMarkers, SpectrumTrace};
use crate::report::ReportDocument;

const DEFAULT_RAW_RULES: &str = include_str!("../../qc_params/check_raw.yml");

/// Detector array extensions of a WEAVE raw frame (two amplifier readouts).
const RAW_DATA_HDUS: [usize; 2] = [1, 2];

/// Histogram range in counts/ADU.
const HIST_RANGE: (f64, f64) = (-1000.0, 70000.0);
const HIST_BINS: usize = 512;

/// QC checks for WEAVE raw detector frames.
#[derive(Debug)]
pub struct WeaveRawChecks {
    container: FitsContainer,
    report: Option<ReportDocument>,
    outdir: PathBuf,
    params_dir: Option<PathBuf>,
}

impl WeaveRawChecks {
    pub const CHECKS: &'static [CheckId] =
        &[CheckId::Primary, CheckId::RawDisplay, CheckId::Histogram];

    pub fn new(input: &Path, ctx: CheckContext) -> Result<Self, QcError> {
        let container = FitsContainer::open(input)?;
        let report = ctx
            .html
            .then(|| ReportDocument::new(&report_title(&container)));
        Ok(WeaveRawChecks {
            container,
            report,
            outdir: ctx.outdir,
            params_dir: ctx.params_dir,
        })
    }

    fn rules(&self) -> Result<RuleSet, QcError> {
        match &self.params_dir {
            Some(dir) => RuleSet::from_file(&dir.join("check_raw.yml")),
            None => RuleSet::from_yaml_str(DEFAULT_RAW_RULES, Path::new("check_raw.yml")),
        }
    }

    /// Validate the primary header against the raw acceptance criteria.
    fn check_primary(&mut self) -> Result<CheckOutcome> {
        let rules = self.rules()?;
        let observed = self.container.observed(0, &rules);
        let results = evaluate(&rules, &observed);
        for result in &results {
            if result.verdict == Verdict::Mismatch {
                warn!(
                    "{}: value {} does not match the declared rule shape for {}",
                    self.container.file_name(),
                    result.value,
                    result.keyword
                );
            }
        }
        if let Some(report) = &mut self.report {
            report.add_table_section(
                "Primary header checks",
                results.iter().map(|r| r.to_row()).collect(),
            );
        }
        Ok(CheckOutcome::table(results))
    }

    /// Log-stretched display of both detector readouts, with centre and
    /// random row/column cuts marked and their sample profiles plotted
    /// underneath each readout.
    fn check_raw(&mut self) -> Result<CheckOutcome> {
        let mut rng = rand::thread_rng();
        let mut panels = Vec::with_capacity(2 * RAW_DATA_HDUS.len());
        for hdu in RAW_DATA_HDUS {
            let plane = self.container.image_plane(hdu)?;
            let markers = CutMarkers {
                centre_row: plane.height / 2,
                centre_col: plane.width / 2,
                random_row: rng.gen_range(0..plane.height),
                random_col: rng.gen_range(0..plane.width),
            };
            panels.push(plot::plane_to_image(&plane, Some(&markers)));
            panels.push(plot::render_spectra(&profile_traces(&plane, &markers)));
        }
        let output = self.outdir.join("raw_image.png");
        plot::save_png(&plot::stack_vertical(&panels, 8), &output)?;
        if let Some(report) = &mut self.report {
            report.add_plot_section("Raw display", "raw_image.png");
        }
        Ok(CheckOutcome::artifact(output))
    }

    /// Count histograms of both detector readouts plus histogram-weighted
    /// mean and sigma per readout.
    fn check_histogram(&mut self) -> Result<CheckOutcome> {
        let mut histograms = Vec::with_capacity(RAW_DATA_HDUS.len());
        let mut stats = Vec::new();
        for hdu in RAW_DATA_HDUS {
            let plane = self.container.image_plane(hdu)?;
            let hist = plot::histogram(&plane.data, HIST_BINS, HIST_RANGE.0, HIST_RANGE.1);
            let (mean, sigma) = hist.weighted_mean_sigma();
            info!(
                "{} HDU {}: mean={:.1} sigma={:.1}",
                self.container.file_name(),
                hdu,
                mean,
                sigma
            );
            stats.push((format!("HDU {} mean", hdu), format!("{:.1}", mean)));
            stats.push((format!("HDU {} sigma", hdu), format!("{:.1}", sigma)));
            histograms.push(hist);
        }
        let output = self.outdir.join("raw_hist.png");
        plot::save_png(&plot::render_histograms(&histograms), &output)?;
        if let Some(report) = &mut self.report {
            report.add_metadata_section("Raw histogram statistics", &stats);
            report.add_plot_section("Raw histogram", "raw_hist.png");
        }
        Ok(CheckOutcome::artifact(output))
    }
}

/// Sample traces along the marked cuts: both rows first, then both
/// columns, with the pixel index as the horizontal axis.
fn profile_traces(plane: &ImagePlane, markers: &CutMarkers) -> Vec<SpectrumTrace> {
    let mut traces = Vec::with_capacity(4);
    for (label, y) in [
        ("Centre row", markers.centre_row),
        ("Random row", markers.random_row),
    ] {
        traces.push(cut_trace(label, plane.row(y).to_vec()));
    }
    for (label, x) in [
        ("Centre column", markers.centre_col),
        ("Random column", markers.random_col),
    ] {
        traces.push(cut_trace(label, plane.column(x)));
    }
    traces
}

fn cut_trace(label: &str, samples: Vec<f64>) -> SpectrumTrace {
    SpectrumTrace {
        label: label.to_string(),
        wavelength: (0..samples.len()).map(|i| i as f64).collect(),
        flux: samples,
        sigma: None,
    }
}

fn report_title(container: &FitsContainer) -> String {
    format!("QC report of {} (weave)", container.file_name())
}

impl CheckSet for WeaveRawChecks {
    fn title(&self) -> String {
        report_title(&self.container)
    }

    fn run(&mut self, check: CheckId) -> Result<CheckOutcome> {
        match check {
            CheckId::Primary => self.check_primary(),
            CheckId::RawDisplay => self.check_raw(),
            CheckId::Histogram => self.check_histogram(),
            other => Err(QcError::Configuration(format!(
                "check '{}' is not part of the weave raw set",
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
    fn test_profile_traces_sample_the_marked_cuts() {
        let plane = ImagePlane {
            width: 3,
            height: 2,
            data: vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0],
        };
        let markers = CutMarkers {
            centre_row: 1,
            centre_col: 0,
            random_row: 0,
            random_col: 2,
        };
        let traces = profile_traces(&plane, &markers);
        assert_eq!(traces.len(), 4);
        assert_eq!(traces[0].flux, vec![10.0, 11.0, 12.0]);
        assert_eq!(traces[1].flux, vec![0.0, 1.0, 2.0]);
        assert_eq!(traces[2].flux, vec![0.0, 10.0]);
        assert_eq!(traces[3].flux, vec![2.0, 12.0]);
        // horizontal axis is the pixel index along the cut
        assert_eq!(traces[0].wavelength, vec![0.0, 1.0, 2.0]);
        assert_eq!(traces[2].wavelength, vec![0.0, 1.0]);
        assert!(traces.iter().all(|t| t.sigma.is_none()));
    }
}
