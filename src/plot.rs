use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::data::ImagePlane;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const TRACE: Rgb<u8> = Rgb([0, 0, 0]);
const BAND: Rgb<u8> = Rgb([235, 160, 160]);
const MEDIAN_LINE: Rgb<u8> = Rgb([160, 160, 160]);
const CENTRE_CUT: Rgb<u8> = Rgb([0, 0, 0]);
const RANDOM_CUT: Rgb<u8> = Rgb([0, 80, 255]);

/// Row/column cut positions overlaid on a detector display.
#[derive(Debug, Clone, Default)]
pub struct CutMarkers {
    pub centre_row: usize,
    pub centre_col: usize,
    pub random_row: usize,
    pub random_col: usize,
}

/// A single line-plot panel: a sampled trace over a monotonic axis.
/// Used for both ranked spectra and detector cut profiles.
#[derive(Debug, Clone)]
pub struct SpectrumTrace {
    pub label: String,
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    /// One-sigma uncertainty per bin, drawn as a band around the trace.
    pub sigma: Option<Vec<f64>>,
}

/// Binned value counts over a fixed range.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub counts: Vec<u64>,
    pub low: f64,
    pub high: f64,
}

impl Histogram {
    /// Bin centre of bin `i`.
    pub fn centre(&self, i: usize) -> f64 {
        let step = (self.high - self.low) / self.counts.len() as f64;
        self.low + (i as f64 + 0.5) * step
    }

    /// Histogram-weighted mean and standard deviation of the bin centres.
    pub fn weighted_mean_sigma(&self) -> (f64, f64) {
        let norm: f64 = self.counts.iter().map(|&c| c as f64).sum();
        if norm == 0.0 {
            return (f64::NAN, f64::NAN);
        }
        let mean = self
            .counts
            .iter()
            .enumerate()
            .map(|(i, &c)| c as f64 * self.centre(i))
            .sum::<f64>()
            / norm;
        let var = self
            .counts
            .iter()
            .enumerate()
            .map(|(i, &c)| c as f64 * (self.centre(i) - mean).powi(2))
            .sum::<f64>()
            / norm;
        (mean, var.sqrt())
    }
}

/// Bin finite values into `bins` equal-width bins over `[low, high)`.
/// Out-of-range and non-finite values are dropped.
pub fn histogram(values: &[f64], bins: usize, low: f64, high: f64) -> Histogram {
    let mut counts = vec![0u64; bins];
    let step = (high - low) / bins as f64;
    for &v in values {
        if !v.is_finite() || v < low || v >= high {
            continue;
        }
        let bin = (((v - low) / step) as usize).min(bins - 1);
        counts[bin] += 1;
    }
    Histogram { counts, low, high }
}

/// Logarithmic stretch of arbitrary values onto 0..=255, ignoring
/// non-finite samples.
pub fn log_stretch(values: &[f64]) -> Vec<u8> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in values {
        if v.is_finite() {
            min = min.min(v);
            max = max.max(v);
        }
    }
    if !min.is_finite() || max <= min {
        return vec![0; values.len()];
    }

    let log_max = (1.0 + max - min).ln();
    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                return 0;
            }
            let normalized = (v - min).max(0.0);
            ((1.0 + normalized).ln() / log_max * 255.0) as u8
        })
        .collect()
}

/// False-colour map for stretched intensities: black through blue, cyan and
/// yellow up to white.
pub fn intensity_to_color(intensity: u8) -> Rgb<u8> {
    let i = intensity as f32 / 255.0;

    let (r, g, b) = if i < 0.25 {
        let t = i * 4.0;
        (0, 0, (t * 255.0) as u8)
    } else if i < 0.5 {
        let t = (i - 0.25) * 4.0;
        (0, (t * 255.0) as u8, 255)
    } else if i < 0.75 {
        let t = (i - 0.5) * 4.0;
        ((t * 255.0) as u8, 255, (255.0 * (1.0 - t)) as u8)
    } else {
        let t = (i - 0.75) * 4.0;
        (255, 255, (255.0 * t) as u8)
    };
    Rgb([r, g, b])
}

/// Render an image plane as a log-stretched false-colour display, with
/// optional row/column cut markers.
pub fn plane_to_image(plane: &ImagePlane, markers: Option<&CutMarkers>) -> RgbImage {
    let stretched = log_stretch(&plane.data);
    let mut img = RgbImage::new(plane.width as u32, plane.height as u32);
    for (i, &level) in stretched.iter().enumerate() {
        let x = (i % plane.width) as u32;
        let y = (i / plane.width) as u32;
        img.put_pixel(x, y, intensity_to_color(level));
    }

    if let Some(m) = markers {
        let w = plane.width as f32;
        let h = plane.height as f32;
        for (row, color) in [(m.centre_row, CENTRE_CUT), (m.random_row, RANDOM_CUT)] {
            let y = row.min(plane.height - 1) as f32;
            draw_line_segment_mut(&mut img, (0.0, y), (w - 1.0, y), color);
        }
        for (col, color) in [(m.centre_col, CENTRE_CUT), (m.random_col, RANDOM_CUT)] {
            let x = col.min(plane.width - 1) as f32;
            draw_line_segment_mut(&mut img, (x, 0.0), (x, h - 1.0), color);
        }
    }
    img
}

/// Stack panels vertically with a white gap between them.
pub fn stack_vertical(panels: &[RgbImage], gap: u32) -> RgbImage {
    let width = panels.iter().map(|p| p.width()).max().unwrap_or(1);
    let height: u32 = panels.iter().map(|p| p.height()).sum::<u32>()
        + gap * panels.len().saturating_sub(1) as u32;
    let mut img = RgbImage::from_pixel(width.max(1), height.max(1), BACKGROUND);

    let mut offset = 0u32;
    for panel in panels {
        for (x, y, pixel) in panel.enumerate_pixels() {
            img.put_pixel(x, offset + y, *pixel);
        }
        offset += panel.height() + gap;
    }
    img
}

/// Render histograms as log-scaled bar panels, one per input histogram.
pub fn render_histograms(histograms: &[Histogram]) -> RgbImage {
    const PANEL_W: u32 = 640;
    const PANEL_H: u32 = 240;
    const MARGIN: u32 = 12;

    let panels: Vec<RgbImage> = histograms
        .iter()
        .map(|hist| {
            let mut img = RgbImage::from_pixel(PANEL_W, PANEL_H, BACKGROUND);
            let plot_h = (PANEL_H - 2 * MARGIN) as f64;
            let max_count = hist.counts.iter().copied().max().unwrap_or(0);
            let log_max = (1.0 + max_count as f64).ln();

            let bar_w = (PANEL_W - 2 * MARGIN) as f64 / hist.counts.len() as f64;
            for (i, &count) in hist.counts.iter().enumerate() {
                if count == 0 || log_max == 0.0 {
                    continue;
                }
                let bar_h = ((1.0 + count as f64).ln() / log_max * plot_h) as u32;
                if bar_h == 0 {
                    continue;
                }
                let x = MARGIN + (i as f64 * bar_w) as u32;
                let y = PANEL_H - MARGIN - bar_h;
                draw_filled_rect_mut(
                    &mut img,
                    Rect::at(x as i32, y as i32).of_size(bar_w.max(1.0) as u32, bar_h),
                    RANDOM_CUT,
                );
            }
            // baseline
            draw_line_segment_mut(
                &mut img,
                (MARGIN as f32, (PANEL_H - MARGIN) as f32),
                ((PANEL_W - MARGIN) as f32, (PANEL_H - MARGIN) as f32),
                AXIS,
            );
            img
        })
        .collect();
    stack_vertical(&panels, 8)
}

/// Render ranked spectra as stacked line panels, each scaled to its own
/// flux range, with the per-panel median drawn as a grey guide line.
pub fn render_spectra(traces: &[SpectrumTrace]) -> RgbImage {
    const PANEL_W: u32 = 800;
    const PANEL_H: u32 = 160;
    const MARGIN: u32 = 10;

    let panels: Vec<RgbImage> = traces.iter().map(|t| render_trace_panel(t, PANEL_W, PANEL_H, MARGIN)).collect();
    stack_vertical(&panels, 6)
}

fn render_trace_panel(trace: &SpectrumTrace, width: u32, height: u32, margin: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

    let finite: Vec<f64> = trace.flux.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || trace.wavelength.len() != trace.flux.len() {
        return img;
    }
    let (mut fmin, mut fmax) = (f64::INFINITY, f64::NEG_INFINITY);
    for &v in &finite {
        fmin = fmin.min(v);
        fmax = fmax.max(v);
    }
    if fmax <= fmin {
        fmax = fmin + 1.0;
    }
    let wmin = trace.wavelength.first().copied().unwrap_or(0.0);
    let wmax = trace.wavelength.last().copied().unwrap_or(1.0);
    let wspan = if wmax > wmin { wmax - wmin } else { 1.0 };

    let to_x = |w: f64| {
        margin as f32 + ((w - wmin) / wspan) as f32 * (width - 2 * margin) as f32
    };
    let to_y = |f: f64| {
        let clamped = f.clamp(fmin, fmax);
        (height - margin) as f32
            - (((clamped - fmin) / (fmax - fmin)) as f32 * (height - 2 * margin) as f32)
    };

    // uncertainty band first so the trace draws on top of it
    if let Some(sigma) = &trace.sigma {
        for i in 1..trace.flux.len() {
            let (f0, f1) = (trace.flux[i - 1], trace.flux[i]);
            let (s0, s1) = (sigma[i - 1], sigma[i]);
            if !(f0.is_finite() && f1.is_finite() && s0.is_finite() && s1.is_finite()) {
                continue;
            }
            let (x0, x1) = (to_x(trace.wavelength[i - 1]), to_x(trace.wavelength[i]));
            draw_line_segment_mut(&mut img, (x0, to_y(f0 + s0)), (x1, to_y(f1 + s1)), BAND);
            draw_line_segment_mut(&mut img, (x0, to_y(f0 - s0)), (x1, to_y(f1 - s1)), BAND);
        }
    }

    let median = median_of(&finite);
    let my = to_y(median);
    draw_line_segment_mut(
        &mut img,
        (margin as f32, my),
        ((width - margin) as f32, my),
        MEDIAN_LINE,
    );

    for i in 1..trace.flux.len() {
        let (f0, f1) = (trace.flux[i - 1], trace.flux[i]);
        if !(f0.is_finite() && f1.is_finite()) {
            continue;
        }
        draw_line_segment_mut(
            &mut img,
            (to_x(trace.wavelength[i - 1]), to_y(f0)),
            (to_x(trace.wavelength[i]), to_y(f1)),
            TRACE,
        );
    }

    // frame
    draw_line_segment_mut(
        &mut img,
        (margin as f32, (height - margin) as f32),
        ((width - margin) as f32, (height - margin) as f32),
        AXIS,
    );
    draw_line_segment_mut(
        &mut img,
        (margin as f32, margin as f32),
        (margin as f32, (height - margin) as f32),
        AXIS,
    );
    img
}

/// Median of the finite values in `values`; NaN when none are finite.
pub fn median_of(values: &[f64]) -> f64 {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = finite.len() / 2;
    if finite.len() % 2 == 0 {
        (finite[mid - 1] + finite[mid]) / 2.0
    } else {
        finite[mid]
    }
}

pub fn save_png(img: &RgbImage, path: &Path) -> Result<()> {
    img.save(path)
        .with_context(|| format!("failed to save plot to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_counts_and_range() {
        let hist = histogram(&[0.5, 1.5, 1.6, 9.9, 10.0, f64::NAN, -1.0], 10, 0.0, 10.0);
        assert_eq!(hist.counts.len(), 10);
        assert_eq!(hist.counts[0], 1);
        assert_eq!(hist.counts[1], 2);
        assert_eq!(hist.counts[9], 1);
        // 10.0 is outside [0, 10), -1.0 and NaN are dropped
        assert_eq!(hist.counts.iter().sum::<u64>(), 4);
    }

    #[test]
    fn test_histogram_weighted_mean_sigma() {
        // all mass in one bin: sigma is zero, mean is the bin centre
        let hist = Histogram {
            counts: vec![0, 100, 0, 0],
            low: 0.0,
            high: 4.0,
        };
        let (mean, sigma) = hist.weighted_mean_sigma();
        assert!((mean - 1.5).abs() < 1e-12);
        assert!(sigma.abs() < 1e-12);
    }

    #[test]
    fn test_histogram_empty_is_nan() {
        let hist = Histogram {
            counts: vec![0, 0],
            low: 0.0,
            high: 1.0,
        };
        let (mean, sigma) = hist.weighted_mean_sigma();
        assert!(mean.is_nan());
        assert!(sigma.is_nan());
    }

    #[test]
    fn test_log_stretch_bounds() {
        let stretched = log_stretch(&[0.0, 10.0, 100.0, f64::NAN]);
        assert_eq!(stretched[0], 0);
        assert!(stretched[1] > 0 && stretched[1] < stretched[2]);
        assert!(stretched[2] >= 254);
        assert_eq!(stretched[3], 0);
    }

    #[test]
    fn test_log_stretch_flat_input() {
        assert_eq!(log_stretch(&[5.0, 5.0, 5.0]), vec![0, 0, 0]);
        assert_eq!(log_stretch(&[f64::NAN, f64::NAN]), vec![0, 0]);
    }

    #[test]
    fn test_intensity_to_color_endpoints() {
        assert_eq!(intensity_to_color(0), Rgb([0, 0, 0]));
        assert_eq!(intensity_to_color(255), Rgb([255, 255, 255]));
        // mid-range lands in the cyan-to-yellow ramp
        let Rgb([_, g, _]) = intensity_to_color(128);
        assert_eq!(g, 255);
    }

    #[test]
    fn test_plane_to_image_dimensions() {
        let plane = ImagePlane {
            width: 4,
            height: 3,
            data: (0..12).map(|v| v as f64).collect(),
        };
        let img = plane_to_image(&plane, None);
        assert_eq!((img.width(), img.height()), (4, 3));
    }

    #[test]
    fn test_stack_vertical_dimensions() {
        let a = RgbImage::new(10, 5);
        let b = RgbImage::new(8, 7);
        let stacked = stack_vertical(&[a, b], 4);
        assert_eq!(stacked.width(), 10);
        assert_eq!(stacked.height(), 5 + 4 + 7);
    }

    #[test]
    fn test_median_of() {
        assert_eq!(median_of(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_of(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median_of(&[f64::NAN, 7.0]), 7.0);
        assert!(median_of(&[]).is_nan());
    }

    #[test]
    fn test_render_histograms_produces_stacked_panels() {
        let hist = histogram(&[1.0, 2.0, 3.0], 16, 0.0, 4.0);
        let img = render_histograms(&[hist.clone(), hist]);
        assert_eq!(img.width(), 640);
        assert_eq!(img.height(), 240 + 8 + 240);
    }

    #[test]
    fn test_render_spectra_handles_empty_trace() {
        let trace = SpectrumTrace {
            label: "p50".to_string(),
            wavelength: vec![],
            flux: vec![],
            sigma: None,
        };
        let img = render_spectra(&[trace]);
        assert_eq!(img.width(), 800);
        assert_eq!(img.height(), 160);
    }
}
