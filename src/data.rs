use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use fitrs::{Fits, FitsData, FitsDataArray, HeaderValue as FitsHeaderValue};
use serde::Serialize;

use crate::criteria::RuleSet;
use crate::error::QcError;

/// A header value as seen by the rule evaluator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Text(String),
    Number(f64),
    /// Keyword absent from the header (or carried an unsupported type).
    Missing,
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Text(s) => f.write_str(s),
            HeaderValue::Number(v) => write!(f, "{}", v),
            HeaderValue::Missing => f.write_str("None"),
        }
    }
}

/// A 2-D image extension, stored row-major with x fastest.
#[derive(Debug, Clone)]
pub struct ImagePlane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

impl ImagePlane {
    /// Build from a FITS array shape. Degenerate planes with a zero-sized
    /// axis are rejected so cut sampling never indexes an empty dimension.
    fn from_array(shape: &[usize], data: Vec<f64>) -> Result<Self, String> {
        if shape.len() < 2 {
            return Err(format!("not a 2-D image (shape {:?})", shape));
        }
        let (width, height) = (shape[0], shape[1]);
        if width == 0 || height == 0 {
            return Err(format!("zero-sized image axis (shape {:?})", shape));
        }
        if data.len() != width * height {
            return Err(format!(
                "data size mismatch: expected {} pixels, got {}",
                width * height,
                data.len()
            ));
        }
        Ok(ImagePlane {
            width,
            height,
            data,
        })
    }

    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    pub fn row(&self, y: usize) -> &[f64] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn column(&self, x: usize) -> Vec<f64> {
        (0..self.height).map(|y| self.get(x, y)).collect()
    }
}

/// A 3-D spectral cube: axes (x, y) are spatial spaxels, z is wavelength.
#[derive(Debug, Clone)]
pub struct DataCube {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub data: Vec<f64>,
}

impl DataCube {
    fn from_array(shape: &[usize], data: Vec<f64>) -> Result<Self, String> {
        if shape.len() < 3 {
            return Err(format!("not a 3-D cube (shape {:?})", shape));
        }
        let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(format!("zero-sized cube axis (shape {:?})", shape));
        }
        if data.len() != nx * ny * nz {
            return Err(format!(
                "data size mismatch: expected {} voxels, got {}",
                nx * ny * nz,
                data.len()
            ));
        }
        Ok(DataCube { nx, ny, nz, data })
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> f64 {
        self.data[x + y * self.nx + z * self.nx * self.ny]
    }

    pub fn spaxels(&self) -> usize {
        self.nx * self.ny
    }

    /// Spectrum of the spaxel at (x, y), one sample per wavelength bin.
    pub fn spectrum(&self, x: usize, y: usize) -> Vec<f64> {
        (0..self.nz).map(|z| self.get(x, y, z)).collect()
    }
}

/// An opened FITS data product. The file handle is released when the
/// container goes out of scope, so per-file processing naturally bounds its
/// lifetime.
#[derive(Debug)]
pub struct FitsContainer {
    path: PathBuf,
    fits: Fits,
}

impl FitsContainer {
    pub fn open(path: &Path) -> Result<Self, QcError> {
        tracing::debug!("opening FITS container {}", path.display());
        let fits = Fits::open(path).map_err(|e| QcError::DataAccess {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(FitsContainer {
            path: path.to_path_buf(),
            fits,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string()
    }

    /// Observed value for one keyword of one HDU. Absent keywords (and
    /// absent HDUs) read as `Missing` rather than failing.
    pub fn header_value(&self, hdu_index: usize, keyword: &str) -> HeaderValue {
        let hdu = match self.fits.get(hdu_index) {
            Some(hdu) => hdu,
            None => return HeaderValue::Missing,
        };
        match hdu.value(keyword) {
            Some(FitsHeaderValue::CharacterString(s)) => HeaderValue::Text(s.trim().to_string()),
            Some(FitsHeaderValue::Logical(b)) => {
                HeaderValue::Text(if *b { "T" } else { "F" }.to_string())
            }
            Some(FitsHeaderValue::IntegerNumber(n)) => HeaderValue::Number(*n as f64),
            Some(FitsHeaderValue::RealFloatingNumber(v)) => HeaderValue::Number(*v),
            // Complex-valued cards are never range- or equality-checked.
            Some(_) => HeaderValue::Missing,
            None => HeaderValue::Missing,
        }
    }

    /// Collect the observed values for every keyword a rule set declares,
    /// in the shape the evaluator consumes.
    pub fn observed(&self, hdu_index: usize, rules: &RuleSet) -> HashMap<String, HeaderValue> {
        rules
            .keywords()
            .map(|kw| (kw.to_string(), self.header_value(hdu_index, kw)))
            .collect()
    }

    pub fn image_plane(&self, hdu_index: usize) -> Result<ImagePlane, QcError> {
        let (shape, data) = self.read_array(hdu_index)?;
        ImagePlane::from_array(&shape, data)
            .map_err(|reason| self.access_error(format!("HDU {}: {}", hdu_index, reason)))
    }

    pub fn cube(&self, hdu_index: usize) -> Result<DataCube, QcError> {
        let (shape, data) = self.read_array(hdu_index)?;
        DataCube::from_array(&shape, data)
            .map_err(|reason| self.access_error(format!("HDU {}: {}", hdu_index, reason)))
    }

    /// Read an array extension as f64 values. Blank integer pixels become
    /// NaN so downstream statistics can skip them.
    fn read_array(&self, hdu_index: usize) -> Result<(Vec<usize>, Vec<f64>), QcError> {
        let hdu = self
            .fits
            .get(hdu_index)
            .ok_or_else(|| self.access_error(format!("no HDU at index {}", hdu_index)))?;

        let (shape, data) = match hdu.read_data() {
            FitsData::IntegersI32(FitsDataArray { shape, data }) => (
                shape,
                data.into_iter()
                    .map(|x| x.map(|v| v as f64).unwrap_or(f64::NAN))
                    .collect(),
            ),
            FitsData::IntegersU32(FitsDataArray { shape, data }) => (
                shape,
                data.into_iter()
                    .map(|x| x.map(|v| v as f64).unwrap_or(f64::NAN))
                    .collect(),
            ),
            FitsData::FloatingPoint32(FitsDataArray { shape, data }) => {
                (shape, data.into_iter().map(|x| x as f64).collect())
            }
            FitsData::FloatingPoint64(FitsDataArray { shape, data }) => (shape, data),
            FitsData::Characters(_) => {
                return Err(self.access_error(format!(
                    "HDU {} holds character data, not an array",
                    hdu_index
                )));
            }
        };
        Ok((shape, data))
    }

    fn access_error(&self, reason: String) -> QcError {
        QcError::DataAccess {
            path: self.path.clone(),
            reason,
        }
    }
}
