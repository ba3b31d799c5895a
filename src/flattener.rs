use itertools::iproduct;
use log::{debug, warn};
use thiserror::Error;

use crate::histogram::{Axis, AxisError, Histogram, HistogramError};

/// Largest number of bins accepted on either axis
pub const MAX_BINS: usize = 1000;

/// Bijection between bin pairs `(bin1, bin2)` and a single global index
///
/// Global indices are enumerated row-major, i.e. `global = bin1 * nbins2 +
/// bin2`. Consumers that compute global indices on their own rely on this
/// ordering.
///
/// The flattener has to be initialised with [init](Self::init), and
/// lookups are only available after [flattened_bins](Self::flattened_bins)
/// has been called.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BinFlattener {
    name: String,
    axis1: Vec<f64>,
    axis2: Vec<f64>,
    is_init: bool,
    // indexed by global
    bins_from_global: Vec<(usize, usize)>,
    // indexed by bin1 * nbins2 + bin2
    global_from_bins: Vec<usize>,
}

impl BinFlattener {
    /// A flattener initialised with the given axes
    pub fn new(
        name: impl Into<String>,
        axis1: &[f64],
        axis2: &[f64],
    ) -> Result<Self, FlattenerError> {
        let mut res = Self::default();
        res.init(name, axis1, axis2)?;
        Ok(res)
    }

    /// Initialise with the given axes
    ///
    /// Each axis defines as many bins as it has entries. Both axes have
    /// to contain between 1 and [MAX_BINS] bins. On failure the flattener
    /// is left uninitialised.
    pub fn init(
        &mut self,
        name: impl Into<String>,
        axis1: &[f64],
        axis2: &[f64],
    ) -> Result<(), FlattenerError> {
        self.clean();
        let name = name.into();
        for (axis, values) in [(1, axis1), (2, axis2)] {
            let nbins = values.len();
            if nbins == 0 {
                warn!("{name}: axis {axis} has no bins");
                return Err(FlattenerError::NoBins { axis });
            }
            if nbins > MAX_BINS {
                warn!("{name}: axis {axis} has {nbins} bins, maximum is {MAX_BINS}");
                return Err(FlattenerError::TooManyBins { axis, nbins });
            }
        }
        debug!(
            "Initialised flattener {name} with {}x{} bins",
            axis1.len(),
            axis2.len()
        );
        self.name = name;
        self.axis1 = axis1.to_vec();
        self.axis2 = axis2.to_vec();
        self.is_init = true;
        Ok(())
    }

    /// Linearly spaced edges for the flattened bins
    ///
    /// Returns `nbins1 * nbins2 + 1` edges from `low` to `high`. Also
    /// builds the lookup tables.
    pub fn flattened_bins(
        &mut self,
        low: f64,
        high: f64,
    ) -> Result<Vec<f64>, FlattenerError> {
        if !self.is_init {
            warn!("Cannot flatten bins, flattener is not initialised");
            return Err(FlattenerError::NotInit);
        }
        if !(low.is_finite() && high.is_finite() && low < high) {
            warn!("{}: invalid range [{low}, {high}]", self.name);
            return Err(FlattenerError::InvalidRange(low, high));
        }
        let nglobal = self.n_bins_global();
        let step = (high - low) / nglobal as f64;
        let mut edges: Vec<_> =
            (0..nglobal).map(|i| low + step * i as f64).collect();
        edges.push(high);
        // the width can overflow, or the step vanish in rounding
        if !step.is_finite() || edges.windows(2).any(|w| !(w[0] < w[1])) {
            warn!(
                "{}: range [{low}, {high}] cannot be split into {nglobal} bins",
                self.name
            );
            return Err(FlattenerError::InvalidRange(low, high));
        }

        self.bins_from_global = iproduct!(0..self.n_bins1(), 0..self.n_bins2())
            .collect();
        self.global_from_bins = vec![0; nglobal];
        let nbins2 = self.n_bins2();
        for (global, &(bin1, bin2)) in self.bins_from_global.iter().enumerate() {
            self.global_from_bins[bin1 * nbins2 + bin2] = global;
        }
        debug_assert_eq!(self.bins_from_global.len(), nglobal);
        Ok(edges)
    }

    fn check_lookup(&self) -> Result<(), FlattenerError> {
        if !self.is_init {
            warn!("Lookup in uninitialised flattener");
            return Err(FlattenerError::NotInit);
        }
        if self.bins_from_global.is_empty() {
            warn!("{}: lookup before flattening bins", self.name);
            return Err(FlattenerError::NotFlattened);
        }
        Ok(())
    }

    fn lookup_global(
        &self,
        global: usize,
    ) -> Result<(usize, usize), FlattenerError> {
        self.check_lookup()?;
        self.bins_from_global.get(global).copied().ok_or_else(|| {
            let nglobal = self.n_bins_global();
            warn!(
                "{}: global bin {global} out of range, need less than {nglobal}",
                self.name
            );
            FlattenerError::GlobalOutOfRange { global, nglobal }
        })
    }

    /// Position on the first axis for the given global bin
    pub fn bin1_from_global(&self, global: usize) -> Result<usize, FlattenerError> {
        self.lookup_global(global).map(|(bin1, _)| bin1)
    }

    /// Position on the second axis for the given global bin
    pub fn bin2_from_global(&self, global: usize) -> Result<usize, FlattenerError> {
        self.lookup_global(global).map(|(_, bin2)| bin2)
    }

    /// Global bin for the given positions on both axes
    pub fn global_from_bins(
        &self,
        bin1: usize,
        bin2: usize,
    ) -> Result<usize, FlattenerError> {
        self.check_lookup()?;
        for (axis, bin, nbins) in
            [(1, bin1, self.n_bins1()), (2, bin2, self.n_bins2())]
        {
            if bin >= nbins {
                warn!(
                    "{}: bin {bin} on axis {axis} out of range, need less than {nbins}",
                    self.name
                );
                return Err(FlattenerError::BinOutOfRange { axis, bin, nbins });
            }
        }
        Ok(self.global_from_bins[bin1 * self.n_bins2() + bin2])
    }

    /// Copy a 2D histogram into a 1D histogram over the flattened bins
    ///
    /// The x axis of `hist` corresponds to the first axis of the
    /// flattener, the y axis to the second one. Flow bins are dropped.
    pub fn flatten_histogram(
        &mut self,
        hist: &Histogram,
        name: impl Into<String>,
    ) -> Result<Histogram, FlattenerError> {
        self.check_histogram(hist)?;
        let (low, high) = self.flat_range();
        let edges = self.flattened_bins(low, high)?;
        let mut flat = Histogram::new_1d(name, hist.title(), Axis::new(edges)?);
        for (global, &(bin1, bin2)) in self.bins_from_global.iter().enumerate() {
            let src = hist.bin(bin1 + 1, bin2 + 1)?;
            flat.set_bin_content(global + 1, hist.bin_content(src)?)?;
            flat.set_bin_error(global + 1, hist.bin_error(src)?)?;
        }
        Ok(flat)
    }

    /// Inverse of [flatten_histogram](Self::flatten_histogram)
    ///
    /// The regular bins of `target` are overwritten with the contents and
    /// errors of the corresponding global bins of `flat`.
    pub fn unflatten_into(
        &self,
        flat: &Histogram,
        target: &mut Histogram,
    ) -> Result<(), FlattenerError> {
        self.check_lookup()?;
        self.check_histogram(target)?;
        let nglobal = self.n_bins_global();
        if flat.ndim() != 1 || flat.x_axis().nbins() != nglobal {
            return Err(FlattenerError::FlatShape {
                expected: nglobal,
                found: flat.x_axis().nbins(),
            });
        }
        for (global, &(bin1, bin2)) in self.bins_from_global.iter().enumerate() {
            let dst = target.bin(bin1 + 1, bin2 + 1)?;
            target.set_bin_content(dst, flat.bin_content(global + 1)?)?;
            target.set_bin_error(dst, flat.bin_error(global + 1)?)?;
        }
        Ok(())
    }

    fn check_histogram(&self, hist: &Histogram) -> Result<(), FlattenerError> {
        if !self.is_init {
            return Err(FlattenerError::NotInit);
        }
        let nx = hist.x_axis().nbins();
        let ny = hist.y_axis().map(Axis::nbins).unwrap_or(0);
        if hist.ndim() != 2 || nx != self.n_bins1() || ny != self.n_bins2() {
            return Err(FlattenerError::HistShape {
                name: hist.name().to_owned(),
                nx,
                ny,
                nbins1: self.n_bins1(),
                nbins2: self.n_bins2(),
            });
        }
        Ok(())
    }

    // flattened histograms count global bins, so use the bin numbers as edges
    fn flat_range(&self) -> (f64, f64) {
        (0., self.n_bins_global() as f64)
    }

    /// Reset to the uninitialised state
    pub fn clean(&mut self) {
        *self = Self::default();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_init(&self) -> bool {
        self.is_init
    }

    pub fn axis1(&self) -> &[f64] {
        &self.axis1
    }

    pub fn axis2(&self) -> &[f64] {
        &self.axis2
    }

    pub fn n_bins1(&self) -> usize {
        self.axis1.len()
    }

    pub fn n_bins2(&self) -> usize {
        self.axis2.len()
    }

    pub fn n_bins_global(&self) -> usize {
        self.n_bins1() * self.n_bins2()
    }
}

/// Error from a [BinFlattener]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlattenerError {
    #[error("Axis {axis} has no bins")]
    NoBins { axis: usize },
    #[error("Axis {axis} has {nbins} bins, maximum is {}", MAX_BINS)]
    TooManyBins { axis: usize, nbins: usize },
    #[error("Flattener is not initialised")]
    NotInit,
    #[error("Flattened bins have not been computed")]
    NotFlattened,
    #[error("Invalid range for flattened bins: [{0}, {1}]")]
    InvalidRange(f64, f64),
    #[error("Global bin {global} out of range, need less than {nglobal}")]
    GlobalOutOfRange { global: usize, nglobal: usize },
    #[error("Bin {bin} on axis {axis} out of range, need less than {nbins}")]
    BinOutOfRange { axis: usize, bin: usize, nbins: usize },
    #[error("Histogram {name} has {nx}x{ny} bins, expected 2D histogram with {nbins1}x{nbins2} bins")]
    HistShape {
        name: String,
        nx: usize,
        ny: usize,
        nbins1: usize,
        nbins2: usize,
    },
    #[error("Flattened histogram has {found} bins, expected {expected}")]
    FlatShape { expected: usize, found: usize },
    #[error("Histogram error: {0}")]
    Histogram(#[from] HistogramError),
    #[error("Failed to construct flattened axis: {0}")]
    Axis(#[from] AxisError),
}
