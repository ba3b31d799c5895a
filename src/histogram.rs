use itertools::zip_eq;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A binning axis with variable-width bins
///
/// Bin numbering follows the ROOT convention: bin 0 is the underflow,
/// bins `1..=nbins` are the regular bins, and bin `nbins + 1` is the
/// overflow.
#[derive(Deserialize, Serialize)]
#[serde(try_from = "RawAxis")]
#[derive(Clone, Debug, PartialEq)]
pub struct Axis {
    edges: Vec<f64>,
}

#[derive(Deserialize)]
struct RawAxis {
    edges: Vec<f64>,
}

impl TryFrom<RawAxis> for Axis {
    type Error = AxisError;

    fn try_from(raw: RawAxis) -> Result<Self, Self::Error> {
        Axis::new(raw.edges)
    }
}

impl Axis {
    /// Construct an axis from its bin edges
    ///
    /// There have to be at least two edges, all of them finite and
    /// strictly increasing.
    pub fn new(edges: Vec<f64>) -> Result<Self, AxisError> {
        use AxisError::*;
        if edges.len() < 2 {
            return Err(TooFewEdges(edges.len()));
        }
        if let Some(pos) = edges.iter().position(|e| !e.is_finite()) {
            return Err(NonFinite(pos, edges[pos]));
        }
        if let Some(pos) = edges.windows(2).position(|w| w[0] >= w[1]) {
            return Err(NotIncreasing(pos + 1, edges[pos], edges[pos + 1]));
        }
        Ok(Self { edges })
    }

    /// Number of regular bins
    pub fn nbins(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn low(&self) -> f64 {
        self.edges[0]
    }

    pub fn high(&self) -> f64 {
        self.edges[self.nbins()]
    }

    /// Bin containing `x`, including under- and overflow
    ///
    /// NaN ends up in the overflow bin.
    pub fn find_bin(&self, x: f64) -> usize {
        if x < self.low() {
            0
        } else if x.is_nan() || x >= self.high() {
            self.nbins() + 1
        } else {
            // first edge strictly above x
            self.edges.partition_point(|&e| e <= x)
        }
    }

    /// Whether the edges agree within `precision`
    ///
    /// Returns the index of the first differing edge, or the length of the
    /// shorter edge list if the number of bins differs.
    pub fn first_mismatch(&self, other: &Axis, precision: f64) -> Option<usize> {
        if self.edges.len() != other.edges.len() {
            return Some(self.edges.len().min(other.edges.len()));
        }
        self.edges
            .iter()
            .zip(&other.edges)
            .position(|(a, b)| (a - b).abs() > precision)
    }
}

/// Error constructing an [Axis]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AxisError {
    #[error("Need at least two bin edges, got {0}")]
    TooFewEdges(usize),
    #[error("Bin edge {0} is not finite: {1}")]
    NonFinite(usize, f64),
    #[error("Bin edges are not strictly increasing at edge {0}: {1} >= {2}")]
    NotIncreasing(usize, f64, f64),
}

/// Weighted one- or two-dimensional histogram
///
/// For each bin we keep the sum of weights and the sum of squared
/// weights, so statistical errors propagate like for ROOT histograms
/// with `Sumw2` enabled.
#[derive(Deserialize, Serialize)]
#[serde(try_from = "RawHistogram")]
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    name: String,
    title: String,
    x: Axis,
    y: Option<Axis>,
    sumw: Vec<f64>,
    sumw2: Vec<f64>,
    entries: f64,
}

#[derive(Deserialize)]
struct RawHistogram {
    name: String,
    title: String,
    x: Axis,
    y: Option<Axis>,
    sumw: Vec<f64>,
    sumw2: Vec<f64>,
    entries: f64,
}

impl TryFrom<RawHistogram> for Histogram {
    type Error = HistogramError;

    fn try_from(raw: RawHistogram) -> Result<Self, Self::Error> {
        let RawHistogram {
            name,
            title,
            x,
            y,
            sumw,
            sumw2,
            entries,
        } = raw;
        let expected = ncells(&x, y.as_ref());
        if sumw.len() != expected || sumw2.len() != expected {
            return Err(HistogramError::CellCount {
                name,
                expected,
                sumw: sumw.len(),
                sumw2: sumw2.len(),
            });
        }
        Ok(Self {
            name,
            title,
            x,
            y,
            sumw,
            sumw2,
            entries,
        })
    }
}

// including flow bins
fn ncells(x: &Axis, y: Option<&Axis>) -> usize {
    (x.nbins() + 2) * y.map(|y| y.nbins() + 2).unwrap_or(1)
}

impl Histogram {
    /// A new, empty one-dimensional histogram
    pub fn new_1d(name: impl Into<String>, title: impl Into<String>, x: Axis) -> Self {
        let nbins = x.nbins() + 2;
        Self {
            name: name.into(),
            title: title.into(),
            x,
            y: None,
            sumw: vec![0.; nbins],
            sumw2: vec![0.; nbins],
            entries: 0.,
        }
    }

    /// A new, empty two-dimensional histogram
    pub fn new_2d(
        name: impl Into<String>,
        title: impl Into<String>,
        x: Axis,
        y: Axis,
    ) -> Self {
        let nbins = ncells(&x, Some(&y));
        Self {
            name: name.into(),
            title: title.into(),
            x,
            y: Some(y),
            sumw: vec![0.; nbins],
            sumw2: vec![0.; nbins],
            entries: 0.,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn x_axis(&self) -> &Axis {
        &self.x
    }

    pub fn y_axis(&self) -> Option<&Axis> {
        self.y.as_ref()
    }

    /// Number of dimensions, either 1 or 2
    pub fn ndim(&self) -> usize {
        if self.y.is_some() {
            2
        } else {
            1
        }
    }

    /// Number of fills
    pub fn entries(&self) -> f64 {
        self.entries
    }

    /// Total number of bins, including all flow bins
    pub fn ncells(&self) -> usize {
        self.sumw.len()
    }

    /// Global bin number for the bin pair `(ix, iy)`
    ///
    /// Both bin numbers include flow bins.
    pub fn bin(&self, ix: usize, iy: usize) -> Result<usize, HistogramError> {
        use HistogramError::*;
        let nx = self.x.nbins() + 2;
        let ny = self.y.as_ref().map(|y| y.nbins() + 2).unwrap_or(1);
        if ix >= nx {
            return Err(BinOutOfRange(ix, nx));
        }
        if iy >= ny {
            return Err(BinOutOfRange(iy, ny));
        }
        Ok(ix + nx * iy)
    }

    /// Fill a one-dimensional histogram
    ///
    /// Returns the global bin that was filled.
    pub fn fill(&mut self, x: f64, weight: f64) -> Result<usize, HistogramError> {
        if self.y.is_some() {
            return Err(HistogramError::WrongDimension {
                expected: 1,
                found: 2,
            });
        }
        let bin = self.x.find_bin(x);
        self.fill_bin(bin, weight);
        Ok(bin)
    }

    /// Fill a two-dimensional histogram
    ///
    /// Returns the global bin that was filled.
    pub fn fill_2d(
        &mut self,
        x: f64,
        y: f64,
        weight: f64,
    ) -> Result<usize, HistogramError> {
        let Some(yaxis) = self.y.as_ref() else {
            return Err(HistogramError::WrongDimension {
                expected: 2,
                found: 1,
            });
        };
        let iy = yaxis.find_bin(y);
        let ix = self.x.find_bin(x);
        let bin = ix + (self.x.nbins() + 2) * iy;
        self.fill_bin(bin, weight);
        Ok(bin)
    }

    fn fill_bin(&mut self, bin: usize, weight: f64) {
        self.sumw[bin] += weight;
        self.sumw2[bin] += weight * weight;
        self.entries += 1.;
    }

    fn check_cell(&self, bin: usize) -> Result<(), HistogramError> {
        if bin < self.ncells() {
            Ok(())
        } else {
            Err(HistogramError::BinOutOfRange(bin, self.ncells()))
        }
    }

    /// Sum of weights in the given global bin
    pub fn bin_content(&self, bin: usize) -> Result<f64, HistogramError> {
        self.check_cell(bin)?;
        Ok(self.sumw[bin])
    }

    /// Statistical error in the given global bin
    pub fn bin_error(&self, bin: usize) -> Result<f64, HistogramError> {
        self.check_cell(bin)?;
        Ok(self.sumw2[bin].sqrt())
    }

    pub fn set_bin_content(
        &mut self,
        bin: usize,
        content: f64,
    ) -> Result<(), HistogramError> {
        self.check_cell(bin)?;
        self.sumw[bin] = content;
        Ok(())
    }

    pub fn set_bin_error(
        &mut self,
        bin: usize,
        error: f64,
    ) -> Result<(), HistogramError> {
        self.check_cell(bin)?;
        self.sumw2[bin] = error * error;
        Ok(())
    }

    /// Sum of weights over the regular bins
    pub fn integral(&self) -> f64 {
        let nx = self.x.nbins();
        match &self.y {
            None => self.sumw[1..=nx].iter().sum(),
            Some(y) => (1..=y.nbins())
                .map(|iy| {
                    let start = 1 + (nx + 2) * iy;
                    self.sumw[start..start + nx].iter().sum::<f64>()
                })
                .sum(),
        }
    }

    /// Check that `other` has the same number of bins along each axis
    pub fn check_shape(&self, other: &Histogram) -> Result<(), HistogramError> {
        let same_shape = self.ndim() == other.ndim()
            && self.x.nbins() == other.x.nbins()
            && self.y.as_ref().map(Axis::nbins)
                == other.y.as_ref().map(Axis::nbins)
            && self.ncells() == other.ncells()
            && self.sumw2.len() == other.sumw2.len();
        if same_shape {
            Ok(())
        } else {
            Err(HistogramError::ShapeMismatch(
                self.name.clone(),
                other.name.clone(),
            ))
        }
    }

    /// Add `coef` times `other` bin by bin
    ///
    /// Squared weights are scaled with `coef²`, so for `coef = ±1` errors
    /// add in quadrature. Only the number of bins is checked, edges are
    /// taken from `self`.
    pub fn add(&mut self, other: &Histogram, coef: f64) -> Result<(), HistogramError> {
        self.check_shape(other)?;
        let coef2 = coef * coef;
        for (w, o) in zip_eq(&mut self.sumw, &other.sumw) {
            *w += coef * o;
        }
        for (w2, o2) in zip_eq(&mut self.sumw2, &other.sumw2) {
            *w2 += coef2 * o2;
        }
        self.entries += other.entries;
        Ok(())
    }

    pub fn scale(&mut self, factor: f64) {
        let factor2 = factor * factor;
        self.sumw.iter_mut().for_each(|w| *w *= factor);
        self.sumw2.iter_mut().for_each(|w2| *w2 *= factor2);
    }

    /// Divide by `other` bin by bin
    ///
    /// Errors are propagated assuming uncorrelated histograms. Bins with
    /// vanishing denominator are set to zero.
    pub fn divide(&mut self, other: &Histogram) -> Result<(), HistogramError> {
        self.check_shape(other)?;
        for bin in 0..self.ncells() {
            let (a, a2) = (self.sumw[bin], self.sumw2[bin]);
            let (b, b2) = (other.sumw[bin], other.sumw2[bin]);
            if b == 0. {
                self.sumw[bin] = 0.;
                self.sumw2[bin] = 0.;
                continue;
            }
            let bsq = b * b;
            self.sumw[bin] = a / b;
            self.sumw2[bin] = (a2 * bsq + b2 * a * a) / (bsq * bsq);
        }
        Ok(())
    }

    /// Set all bins to zero
    pub fn reset(&mut self) {
        self.sumw.iter_mut().for_each(|w| *w = 0.);
        self.sumw2.iter_mut().for_each(|w2| *w2 = 0.);
        self.entries = 0.;
    }
}

/// Histogram error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistogramError {
    #[error("Expected a {expected}D histogram, found {found}D")]
    WrongDimension { expected: usize, found: usize },
    #[error("Bin {0} out of range, need less than {1}")]
    BinOutOfRange(usize, usize),
    #[error("Histograms {0} and {1} have different number of bins")]
    ShapeMismatch(String, String),
    #[error(
        "Histogram {name} needs {expected} cells, found {sumw} weights and {sumw2} squared weights"
    )]
    CellCount {
        name: String,
        expected: usize,
        sumw: usize,
        sumw2: usize,
    },
}
