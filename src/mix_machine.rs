use std::convert::Infallible;
use std::path::Path;

use itertools::{zip_eq, Itertools};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use strum::{EnumCount, IntoEnumIterator};
use thiserror::Error;

use crate::channel::{Channel, MixMode};
use crate::compression::Compression;
use crate::config::{Config, ConfigError};
use crate::file::{ObjectFile, ObjectFileError};
use crate::histogram::{Axis, Histogram, HistogramError};
use crate::traits::WriteObject;

/// Default tolerance when comparing bin edges of different machines
pub const DEFAULT_PRECISION: f64 = 1e-5;

const REQUIRED_KEYS: [&str; 5] = ["IS2DUNFOLD", "ISMC", "NBINSX", "BINSX", "TITLEX"];
const REQUIRED_KEYS_2D: [&str; 3] = ["NBINSY", "BINSY", "TITLEY"];

/// Parallel histograms for the raw distribution and its mixed-event
/// background
///
/// Which histograms ("channels") exist depends on the [MixMode]:
///
/// - [MixMode::None]: RAW, SUB
/// - [MixMode::Inclusive]: RAW, MIX, SUB
/// - [MixMode::Multi]: RAW, MIX, MIXCORRECTION, MIXCORRECTED, SUB
///
/// Monte Carlo machines additionally have TRUTH and TRUTHMATCHEDRECO
/// channels. All channels share the same binning. After filling,
/// [compute_sub](Self::compute_sub) derives the background-subtracted
/// SUB channel.
#[derive(Deserialize, Serialize)]
#[serde(try_from = "RawMixMachine")]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MixMachine {
    name: String,
    mode: MixMode,
    is_mc: bool,
    is_2d: bool,
    is_init: bool,
    hists: [Option<Histogram>; Channel::COUNT],
}

#[derive(Deserialize)]
struct RawMixMachine {
    name: String,
    mode: MixMode,
    is_mc: bool,
    is_2d: bool,
    is_init: bool,
    hists: [Option<Histogram>; Channel::COUNT],
}

impl TryFrom<RawMixMachine> for MixMachine {
    type Error = MachineError;

    /// Accept only machines that [init](MixMachine::init) could have built:
    /// exactly the active channels are booked, all with the same binning.
    fn try_from(raw: RawMixMachine) -> Result<Self, Self::Error> {
        let RawMixMachine {
            name,
            mode,
            is_mc,
            is_2d,
            is_init,
            hists,
        } = raw;
        let inconsistent = |reason: String| MachineError::Inconsistent {
            name: name.clone(),
            reason,
        };
        let active = if is_init { mode.channels(is_mc) } else { Vec::new() };
        let ndim = if is_2d { 2 } else { 1 };
        let mut reference: Option<&Histogram> = None;
        for channel in Channel::iter() {
            let hist = hists[channel.idx()].as_ref();
            match (active.contains(&channel), hist) {
                (true, None) => {
                    return Err(inconsistent(format!("channel {channel} is missing")))
                }
                (false, Some(_)) => {
                    return Err(inconsistent(format!(
                        "channel {channel} is not active in mode {mode}"
                    )))
                }
                (false, None) => {}
                (true, Some(hist)) => {
                    if hist.ndim() != ndim {
                        return Err(inconsistent(format!(
                            "channel {channel} is {}D instead of {ndim}D",
                            hist.ndim()
                        )));
                    }
                    match reference {
                        None => reference = Some(hist),
                        Some(reference) => {
                            let same_binning = reference.check_shape(hist).is_ok()
                                && reference.x_axis() == hist.x_axis()
                                && reference.y_axis() == hist.y_axis();
                            if !same_binning {
                                return Err(inconsistent(format!(
                                    "binning of channel {channel} differs"
                                )));
                            }
                        }
                    }
                }
            }
        }
        Ok(Self {
            name,
            mode,
            is_mc,
            is_2d,
            is_init,
            hists,
        })
    }
}

impl MixMachine {
    /// A new machine initialised from `config`
    ///
    /// See [init](Self::init) for details.
    pub fn new(
        name: impl Into<String>,
        mode: MixMode,
        config: &Config,
    ) -> Result<Self, ConfigError> {
        let mut res = Self::default();
        res.init(name, mode, config)?;
        Ok(res)
    }

    /// Initialise from a configuration
    ///
    /// The configuration has to provide the keys `IS2DUNFOLD`, `ISMC`,
    /// `NBINSX`, `BINSX`, `TITLEX` and, for two-dimensional machines,
    /// `NBINSY`, `BINSY`, `TITLEY`. `BINSX` and `BINSY` list the bin edges.
    ///
    /// One histogram named `{name}_MIXMODE{mode}_{CHANNEL}_h` is booked for
    /// each active channel. On failure the machine is left uninitialised.
    pub fn init(
        &mut self,
        name: impl Into<String>,
        mode: MixMode,
        config: &Config,
    ) -> Result<(), ConfigError> {
        self.clean();
        let name = name.into();

        config.check_keys(&REQUIRED_KEYS)?;
        let is_2d = config.get_bool("IS2DUNFOLD")?;
        if is_2d {
            config.check_keys(&REQUIRED_KEYS_2D)?;
        }
        let is_mc = config.get_bool("ISMC")?;
        let x = read_axis(config, "NBINSX", "BINSX")?;
        let x_title = config.get_str("TITLEX")?;
        let y = if is_2d {
            let y = read_axis(config, "NBINSY", "BINSY")?;
            Some((y, config.get_str("TITLEY")?))
        } else {
            None
        };

        let mut hists: [Option<Histogram>; Channel::COUNT] = Default::default();
        for channel in mode.channels(is_mc) {
            let hist_name = format!("{name}_MIXMODE{}_{channel}_h", mode.code());
            let hist = match &y {
                None => Histogram::new_1d(
                    hist_name,
                    format!(";{x_title};Counts"),
                    x.clone(),
                ),
                Some((y, y_title)) => Histogram::new_2d(
                    hist_name,
                    format!(";{x_title};{y_title}"),
                    x.clone(),
                    y.clone(),
                ),
            };
            hists[channel.idx()] = Some(hist);
        }
        debug!(
            "Initialised machine {name} in mode {mode} (MC: {is_mc}, 2D: {is_2d})"
        );
        *self = Self {
            name,
            mode,
            is_mc,
            is_2d,
            is_init: true,
            hists,
        };
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> MixMode {
        self.mode
    }

    pub fn is_mc(&self) -> bool {
        self.is_mc
    }

    pub fn is_2d(&self) -> bool {
        self.is_2d
    }

    pub fn is_init(&self) -> bool {
        self.is_init
    }

    /// Active channels
    pub fn channels(&self) -> Vec<Channel> {
        if self.is_init {
            self.mode.channels(self.is_mc)
        } else {
            Vec::new()
        }
    }

    /// Bin edges along x
    pub fn x_edges(&self) -> Option<&[f64]> {
        self.reference_hist().map(|h| h.x_axis().edges())
    }

    /// Bin edges along y, for two-dimensional machines
    pub fn y_edges(&self) -> Option<&[f64]> {
        self.reference_hist()
            .and_then(|h| h.y_axis())
            .map(|y| y.edges())
    }

    // RAW is present in every mode
    fn reference_hist(&self) -> Option<&Histogram> {
        self.hists[Channel::Raw.idx()].as_ref()
    }

    fn check_init(&self) -> Result<(), MachineError> {
        if self.is_init {
            Ok(())
        } else {
            warn!("Machine {} is not initialised", self.name);
            Err(MachineError::NotInit)
        }
    }

    fn inactive(&self, channel: Channel) -> MachineError {
        let available = self.channels();
        warn!(
            "{}: channel {channel} not available in mode {}, available channels: {}",
            self.name,
            self.mode,
            available.iter().join(", ")
        );
        MachineError::InactiveChannel {
            channel,
            mode: self.mode,
            available,
        }
    }

    fn parse_channel(&self, name: &str) -> Result<Channel, MachineError> {
        name.parse().map_err(|_| {
            let available = self.channels();
            warn!(
                "{}: unknown channel {name}, available channels: {}",
                self.name,
                available.iter().join(", ")
            );
            MachineError::UnknownChannel {
                name: name.to_owned(),
                available,
            }
        })
    }

    fn channel(&self, channel: Channel) -> Result<&Histogram, MachineError> {
        self.check_init()?;
        self.hists[channel.idx()]
            .as_ref()
            .ok_or_else(|| self.inactive(channel))
    }

    fn channel_mut(
        &mut self,
        channel: Channel,
    ) -> Result<&mut Histogram, MachineError> {
        self.check_init()?;
        match self.hists[channel.idx()] {
            Some(ref mut hist) => Ok(hist),
            None => Err(self.inactive(channel)),
        }
    }

    fn check_dim(&self, expected: usize) -> Result<(), MachineError> {
        let found = if self.is_2d { 2 } else { 1 };
        if found == expected {
            Ok(())
        } else {
            warn!(
                "{}: expected {expected}D machine, but it is {found}D",
                self.name
            );
            Err(MachineError::WrongDimension { expected, found })
        }
    }

    /// Fill the given channel of a one-dimensional machine
    pub fn fill_x(
        &mut self,
        value: f64,
        weight: f64,
        channel: Channel,
    ) -> Result<(), MachineError> {
        self.check_init()?;
        self.check_dim(1)?;
        self.channel_mut(channel)?.fill(value, weight)?;
        Ok(())
    }

    /// Fill the given channel of a two-dimensional machine
    pub fn fill_xy(
        &mut self,
        x: f64,
        y: f64,
        weight: f64,
        channel: Channel,
    ) -> Result<(), MachineError> {
        self.check_init()?;
        self.check_dim(2)?;
        self.channel_mut(channel)?.fill_2d(x, y, weight)?;
        Ok(())
    }

    /// Fill the channel with the given name, e.g. "RAW"
    pub fn fill_x_named(
        &mut self,
        value: f64,
        weight: f64,
        channel: &str,
    ) -> Result<(), MachineError> {
        let channel = self.parse_channel(channel)?;
        self.fill_x(value, weight, channel)
    }

    /// Fill the channel with the given name, e.g. "RAW"
    pub fn fill_xy_named(
        &mut self,
        x: f64,
        y: f64,
        weight: f64,
        channel: &str,
    ) -> Result<(), MachineError> {
        let channel = self.parse_channel(channel)?;
        self.fill_xy(x, y, weight, channel)
    }

    pub fn fill_x_raw(&mut self, value: f64, weight: f64) -> Result<(), MachineError> {
        self.fill_x(value, weight, Channel::Raw)
    }

    pub fn fill_x_mix(&mut self, value: f64, weight: f64) -> Result<(), MachineError> {
        self.fill_x(value, weight, Channel::Mix)
    }

    pub fn fill_x_mix_correction(
        &mut self,
        value: f64,
        weight: f64,
    ) -> Result<(), MachineError> {
        self.fill_x(value, weight, Channel::MixCorrection)
    }

    pub fn fill_x_truth(&mut self, value: f64, weight: f64) -> Result<(), MachineError> {
        self.fill_x(value, weight, Channel::Truth)
    }

    pub fn fill_x_truth_matched_reco(
        &mut self,
        value: f64,
        weight: f64,
    ) -> Result<(), MachineError> {
        self.fill_x(value, weight, Channel::TruthMatchedReco)
    }

    pub fn fill_xy_raw(
        &mut self,
        x: f64,
        y: f64,
        weight: f64,
    ) -> Result<(), MachineError> {
        self.fill_xy(x, y, weight, Channel::Raw)
    }

    pub fn fill_xy_mix(
        &mut self,
        x: f64,
        y: f64,
        weight: f64,
    ) -> Result<(), MachineError> {
        self.fill_xy(x, y, weight, Channel::Mix)
    }

    pub fn fill_xy_mix_correction(
        &mut self,
        x: f64,
        y: f64,
        weight: f64,
    ) -> Result<(), MachineError> {
        self.fill_xy(x, y, weight, Channel::MixCorrection)
    }

    pub fn fill_xy_truth(
        &mut self,
        x: f64,
        y: f64,
        weight: f64,
    ) -> Result<(), MachineError> {
        self.fill_xy(x, y, weight, Channel::Truth)
    }

    pub fn fill_xy_truth_matched_reco(
        &mut self,
        x: f64,
        y: f64,
        weight: f64,
    ) -> Result<(), MachineError> {
        self.fill_xy(x, y, weight, Channel::TruthMatchedReco)
    }

    /// Compute the background-subtracted signal
    ///
    /// - [MixMode::None]: SUB = RAW
    /// - [MixMode::Inclusive]: SUB = RAW - MIX
    /// - [MixMode::Multi]: MIXCORRECTED = MIX - MIXCORRECTION,
    ///   SUB = RAW - MIXCORRECTED
    ///
    /// Statistical errors are added in quadrature. The derived channels are
    /// recomputed from scratch, so calling this repeatedly gives the same
    /// result.
    pub fn compute_sub(&mut self) -> Result<(), MachineError> {
        use Channel::*;
        self.check_init()?;
        match self.mode {
            MixMode::None => self.set_difference(Sub, Raw, None),
            MixMode::Inclusive => self.set_difference(Sub, Raw, Some(Mix)),
            MixMode::Multi => {
                self.set_difference(MixCorrected, Mix, Some(MixCorrection))?;
                self.set_difference(Sub, Raw, Some(MixCorrected))
            }
        }
    }

    // target = minuend - subtrahend
    fn set_difference(
        &mut self,
        target: Channel,
        minuend: Channel,
        subtrahend: Option<Channel>,
    ) -> Result<(), MachineError> {
        let mut res = self.channel(target)?.clone();
        res.reset();
        res.add(self.channel(minuend)?, 1.)?;
        if let Some(subtrahend) = subtrahend {
            res.add(self.channel(subtrahend)?, -1.)?;
        }
        *self.channel_mut(target)? = res;
        Ok(())
    }

    fn check_both_init(&self, other: &MixMachine) -> Result<(), MachineMismatch> {
        if self.is_init && other.is_init {
            Ok(())
        } else {
            Err(MachineMismatch::NotInit)
        }
    }

    /// Check that both machines use the same [MixMode]
    pub fn check_match_mode(&self, other: &MixMachine) -> Result<(), MachineMismatch> {
        self.check_both_init(other)?;
        if self.mode == other.mode {
            Ok(())
        } else {
            warn!(
                "Machines {} and {} have different modes: {} and {}",
                self.name, other.name, self.mode, other.mode
            );
            Err(MachineMismatch::Mode(self.mode, other.mode))
        }
    }

    /// Check that either both or neither machine is Monte Carlo
    pub fn check_match_mc(&self, other: &MixMachine) -> Result<(), MachineMismatch> {
        self.check_both_init(other)?;
        if self.is_mc == other.is_mc {
            Ok(())
        } else {
            warn!(
                "Machines {} and {} disagree on MC: {} and {}",
                self.name, other.name, self.is_mc, other.is_mc
            );
            Err(MachineMismatch::Mc(self.is_mc, other.is_mc))
        }
    }

    /// Check that both machines have the same dimension
    pub fn check_match_2d(&self, other: &MixMachine) -> Result<(), MachineMismatch> {
        self.check_both_init(other)?;
        if self.is_2d == other.is_2d {
            Ok(())
        } else {
            warn!(
                "Machines {} and {} disagree on 2D: {} and {}",
                self.name, other.name, self.is_2d, other.is_2d
            );
            Err(MachineMismatch::Dimension(self.is_2d, other.is_2d))
        }
    }

    /// Check that bin edges agree within `precision`
    ///
    /// The error points to the first mismatch.
    pub fn check_match_bins(
        &self,
        other: &MixMachine,
        precision: f64,
    ) -> Result<(), MachineMismatch> {
        self.check_both_init(other)?;
        let (Some(lhs), Some(rhs)) = (self.reference_hist(), other.reference_hist())
        else {
            return Err(MachineMismatch::NotInit);
        };
        compare_axes('x', lhs.x_axis(), rhs.x_axis(), precision)?;
        match (lhs.y_axis(), rhs.y_axis()) {
            (Some(y), Some(other_y)) => compare_axes('y', y, other_y, precision)?,
            (None, None) => {}
            _ => return Err(MachineMismatch::Dimension(self.is_2d, other.is_2d)),
        }
        Ok(())
    }

    /// Run all compatibility checks
    pub fn check_matches(
        &self,
        other: &MixMachine,
        precision: f64,
    ) -> Result<(), MachineMismatch> {
        self.check_match_mode(other)?;
        self.check_match_mc(other)?;
        self.check_match_2d(other)?;
        self.check_match_bins(other, precision)
    }

    /// Add all channels of `other` to this machine
    ///
    /// Fails without modifying `self` if the machines are not compatible,
    /// see [check_matches](Self::check_matches).
    pub fn add(
        &mut self,
        other: &MixMachine,
        precision: f64,
    ) -> Result<(), MachineMismatch> {
        self.add_many(&[other], precision)
    }

    /// Add all channels of two other machines to this machine
    pub fn add_two(
        &mut self,
        other1: &MixMachine,
        other2: &MixMachine,
        precision: f64,
    ) -> Result<(), MachineMismatch> {
        self.add_many(&[other1, other2], precision)
    }

    /// Add all channels of all `others` to this machine
    ///
    /// Every machine is checked before anything is added.
    pub fn add_many(
        &mut self,
        others: &[&MixMachine],
        precision: f64,
    ) -> Result<(), MachineMismatch> {
        for other in others {
            self.check_matches(other, precision)?;
            for (hist, other_hist) in zip_eq(&self.hists, &other.hists) {
                if let (Some(hist), Some(other_hist)) = (hist, other_hist) {
                    hist.check_shape(other_hist)?;
                }
            }
        }
        for other in others {
            debug!("Adding machine {} to {}", other.name, self.name);
            for (hist, other_hist) in zip_eq(&mut self.hists, &other.hists) {
                if let (Some(hist), Some(other_hist)) = (hist, other_hist) {
                    hist.add(other_hist, 1.)?;
                }
            }
        }
        Ok(())
    }

    /// Histogram of a one-dimensional machine
    pub fn hist1d(&self, channel: Channel) -> Result<&Histogram, MachineError> {
        self.check_init()?;
        self.check_dim(1)?;
        self.channel(channel)
    }

    /// Histogram of a two-dimensional machine
    pub fn hist2d(&self, channel: Channel) -> Result<&Histogram, MachineError> {
        self.check_init()?;
        self.check_dim(2)?;
        self.channel(channel)
    }

    pub fn hist1d_named(&self, channel: &str) -> Result<&Histogram, MachineError> {
        self.hist1d(self.parse_channel(channel)?)
    }

    pub fn hist2d_named(&self, channel: &str) -> Result<&Histogram, MachineError> {
        self.hist2d(self.parse_channel(channel)?)
    }

    /// Mutable access to a channel, e.g. for rescaling
    pub fn hist_mut(&mut self, channel: Channel) -> Result<&mut Histogram, MachineError> {
        self.channel_mut(channel)
    }

    /// Iterator over all active channels and their histograms
    pub fn histograms(&self) -> impl Iterator<Item = (Channel, &Histogram)> {
        self.channels()
            .into_iter()
            .filter_map(|c| self.hists[c.idx()].as_ref().map(|h| (c, h)))
    }

    /// Write all channel histograms to `sink`
    ///
    /// Existing objects with the same names are replaced.
    pub fn write_to<W: WriteObject>(
        &self,
        sink: &mut W,
    ) -> Result<(), WriteError<W::Error>> {
        if !self.is_init {
            warn!("Nothing to write, machine {} is not initialised", self.name);
            return Err(WriteError::NotInit);
        }
        for (_, hist) in self.histograms() {
            sink.write_object(hist).map_err(WriteError::Sink)?;
        }
        Ok(())
    }

    /// Write all channel histograms to the file at `path`
    ///
    /// Other objects already in the file are kept, objects with the same
    /// names are replaced.
    pub fn write_to_file<P: AsRef<Path>>(
        &self,
        path: P,
        compression: Option<Compression>,
    ) -> Result<(), WriteError<ObjectFileError>> {
        if !self.is_init {
            warn!("Nothing to write, machine {} is not initialised", self.name);
            return Err(WriteError::NotInit);
        }
        let mut file = ObjectFile::open(path)
            .map_err(WriteError::Sink)?
            .with_compression(compression);
        self.write_to(&mut file).map_err(WriteError::into_sink_error)?;
        file.save().map_err(WriteError::Sink)
    }

    /// Release all histograms and return to the uninitialised state
    pub fn clean(&mut self) {
        *self = Self::default();
    }
}

fn read_axis(
    config: &Config,
    nbins_key: &'static str,
    edges_key: &'static str,
) -> Result<Axis, ConfigError> {
    let nbins = config.get_usize(nbins_key)?;
    if nbins == 0 {
        return Err(ConfigError::InvalidValue {
            key: nbins_key.to_owned(),
            value: nbins.to_string(),
            expected: "a positive integer",
        });
    }
    let edges = config.get_f64_list(edges_key)?;
    if edges.len() != nbins + 1 {
        return Err(ConfigError::BinCount {
            key: nbins_key,
            nbins,
            edges_key,
            nedges: edges.len(),
        });
    }
    Axis::new(edges).map_err(|source| ConfigError::Binning {
        key: edges_key,
        source,
    })
}

fn compare_axes(
    axis: char,
    lhs: &Axis,
    rhs: &Axis,
    precision: f64,
) -> Result<(), MachineMismatch> {
    if lhs.nbins() != rhs.nbins() {
        warn!(
            "Different number of bins along {axis}: {} and {}",
            lhs.nbins(),
            rhs.nbins()
        );
        return Err(MachineMismatch::NBins {
            axis,
            lhs: lhs.nbins(),
            rhs: rhs.nbins(),
        });
    }
    if let Some(edge) = lhs.first_mismatch(rhs, precision) {
        let (lhs, rhs) = (lhs.edges()[edge], rhs.edges()[edge]);
        warn!("Bin edge {edge} along {axis} differs: {lhs} and {rhs}");
        return Err(MachineMismatch::Edge {
            axis,
            edge,
            lhs,
            rhs,
            precision,
        });
    }
    Ok(())
}

/// Misuse of a [MixMachine]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MachineError {
    #[error("Machine is not initialised")]
    NotInit,
    #[error(
        "Channel {channel} not available in mode {mode}, available channels: {}",
        .available.iter().join(", ")
    )]
    InactiveChannel {
        channel: Channel,
        mode: MixMode,
        available: Vec<Channel>,
    },
    #[error(
        "Unknown channel {name}, available channels: {}",
        .available.iter().join(", ")
    )]
    UnknownChannel { name: String, available: Vec<Channel> },
    #[error("Expected a {expected}D machine, found {found}D")]
    WrongDimension { expected: usize, found: usize },
    #[error("Inconsistent machine {name}: {reason}")]
    Inconsistent { name: String, reason: String },
    #[error("Histogram error: {0}")]
    Histogram(#[from] HistogramError),
}

/// Error writing the histograms of a [MixMachine]
#[derive(Debug, Error)]
pub enum WriteError<E> {
    #[error("Machine is not initialised")]
    NotInit,
    #[error("Failed to write histograms")]
    Sink(#[source] E),
}

impl WriteError<Infallible> {
    fn into_sink_error<E>(self) -> WriteError<E> {
        match self {
            WriteError::NotInit => WriteError::NotInit,
            WriteError::Sink(never) => match never {},
        }
    }
}

/// Incompatibility between two [MixMachine]s
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MachineMismatch {
    #[error("Machine is not initialised")]
    NotInit,
    #[error("Different mix modes: {0} and {1}")]
    Mode(MixMode, MixMode),
    #[error("Different MC flags: {0} and {1}")]
    Mc(bool, bool),
    #[error("Different dimensions, 2D flags are {0} and {1}")]
    Dimension(bool, bool),
    #[error("Different number of bins along {axis}: {lhs} and {rhs}")]
    NBins { axis: char, lhs: usize, rhs: usize },
    #[error("Bin edge {edge} along {axis} differs by more than {precision}: {lhs} and {rhs}")]
    Edge {
        axis: char,
        edge: usize,
        lhs: f64,
        rhs: f64,
        precision: f64,
    },
    #[error("Histogram error: {0}")]
    Histogram(#[from] HistogramError),
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::directory::Directory;

    fn log_init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn config_1d(is_mc: bool) -> Config {
        [
            ("IS2DUNFOLD", "0"),
            ("ISMC", if is_mc { "1" } else { "0" }),
            ("NBINSX", "3"),
            ("BINSX", "50,60,80,120"),
            ("TITLEX", "p_{T}^{#gamma}"),
        ]
        .into_iter()
        .collect()
    }

    fn config_2d() -> Config {
        let mut config = config_1d(false);
        config
            .set("IS2DUNFOLD", "true")
            .set("NBINSY", "2")
            .set("BINSY", "0 1.5 3.14159")
            .set("TITLEY", "#Delta#phi");
        config
    }

    fn machine(mode: MixMode) -> MixMachine {
        MixMachine::new("photonPt", mode, &config_1d(false)).unwrap()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn init() {
        log_init();
        let m = MixMachine::new("photonPt", MixMode::Inclusive, &config_1d(true))
            .unwrap();
        assert!(m.is_init());
        assert!(m.is_mc());
        assert!(!m.is_2d());
        let names: Vec<_> = m.histograms().map(|(_, h)| h.name().to_owned()).collect();
        assert_eq!(
            names,
            [
                "photonPt_MIXMODE1_RAW_h",
                "photonPt_MIXMODE1_MIX_h",
                "photonPt_MIXMODE1_SUB_h",
                "photonPt_MIXMODE1_TRUTH_h",
                "photonPt_MIXMODE1_TRUTHMATCHEDRECO_h",
            ]
        );
        assert_eq!(m.x_edges(), Some([50., 60., 80., 120.].as_slice()));
        assert_eq!(m.y_edges(), None);

        let m = MixMachine::new("dphi", MixMode::Multi, &config_2d()).unwrap();
        assert!(m.is_2d());
        assert_eq!(m.channels().len(), 5);
        assert_eq!(m.y_edges().unwrap().len(), 3);
    }

    #[test]
    fn init_errors() {
        log_init();
        let mut m = MixMachine::default();
        let mut config = config_1d(false);
        config.set("IS2DUNFOLD", "1");
        match m.init("m", MixMode::None, &config) {
            Err(ConfigError::MissingKeys(keys)) => {
                assert_eq!(keys, ["NBINSY", "BINSY", "TITLEY"])
            }
            res => panic!("unexpected result {res:?}"),
        }
        assert!(!m.is_init());

        let mut config = config_1d(false);
        config.set("NBINSX", "4");
        assert!(matches!(
            m.init("m", MixMode::None, &config),
            Err(ConfigError::BinCount { nbins: 4, nedges: 4, .. })
        ));

        config.set("NBINSX", "0").set("BINSX", "1");
        assert!(matches!(
            m.init("m", MixMode::None, &config),
            Err(ConfigError::InvalidValue { .. })
        ));

        config.set("NBINSX", "2").set("BINSX", "1, 3, 2");
        assert!(matches!(
            m.init("m", MixMode::None, &config),
            Err(ConfigError::Binning { .. })
        ));
        assert!(!m.is_init());
        assert!(matches!(m.fill_x_raw(1., 1.), Err(MachineError::NotInit)));
    }

    #[test]
    fn sub_none() {
        log_init();
        let mut m = machine(MixMode::None);
        for (x, w) in [(55., 1.), (55., 2.), (70., 0.5), (130., 1.)] {
            m.fill_x_raw(x, w).unwrap();
        }
        m.compute_sub().unwrap();
        let raw = m.hist1d(Channel::Raw).unwrap();
        let sub = m.hist1d(Channel::Sub).unwrap();
        for bin in 0..raw.ncells() {
            assert_close(sub.bin_content(bin).unwrap(), raw.bin_content(bin).unwrap());
            assert_close(sub.bin_error(bin).unwrap(), raw.bin_error(bin).unwrap());
        }
    }

    #[test]
    fn sub_inclusive() {
        log_init();
        let mut m = machine(MixMode::Inclusive);
        m.fill_x_raw(65., 5.).unwrap();
        m.fill_x_mix(65., 2.).unwrap();
        m.compute_sub().unwrap();
        let sub = m.hist1d(Channel::Sub).unwrap();
        assert_close(sub.bin_content(2).unwrap(), 3.);
        assert_close(sub.bin_error(2).unwrap(), (25f64 + 4.).sqrt());
        assert_close(sub.bin_content(1).unwrap(), 0.);
    }

    #[test]
    fn sub_multi() {
        log_init();
        let mut m = machine(MixMode::Multi);
        m.fill_x_raw(100., 10.).unwrap();
        m.fill_x_mix(100., 4.).unwrap();
        m.fill_x_mix_correction(100., 1.).unwrap();
        m.compute_sub().unwrap();
        let corrected = m.hist1d(Channel::MixCorrected).unwrap();
        assert_close(corrected.bin_content(3).unwrap(), 3.);
        assert_close(corrected.bin_error(3).unwrap(), 17f64.sqrt());
        let sub = m.hist1d(Channel::Sub).unwrap();
        assert_close(sub.bin_content(3).unwrap(), 7.);
        assert_close(sub.bin_error(3).unwrap(), 117f64.sqrt());
    }

    #[test]
    fn sub_idempotent() {
        log_init();
        let mut m = machine(MixMode::Inclusive);
        m.fill_x_raw(65., 5.).unwrap();
        m.fill_x_mix(65., 2.).unwrap();
        m.compute_sub().unwrap();
        let first = m.clone();
        m.compute_sub().unwrap();
        assert_eq!(m, first);
    }

    #[test]
    fn sub_before_fill() {
        log_init();
        let mut m = machine(MixMode::Multi);
        m.compute_sub().unwrap();
        assert_eq!(m.hist1d(Channel::Sub).unwrap().integral(), 0.);
    }

    #[test]
    fn fill_errors() {
        log_init();
        let mut m = machine(MixMode::None);
        assert!(matches!(
            m.fill_x_mix(55., 1.),
            Err(MachineError::InactiveChannel { channel: Channel::Mix, .. })
        ));
        assert!(matches!(
            m.fill_x_truth(55., 1.),
            Err(MachineError::InactiveChannel { .. })
        ));
        match m.fill_x_named(55., 1., "BKG") {
            Err(MachineError::UnknownChannel { name, available }) => {
                assert_eq!(name, "BKG");
                assert_eq!(available, [Channel::Raw, Channel::Sub]);
            }
            res => panic!("unexpected result {res:?}"),
        }
        m.fill_x_named(55., 1., "RAW").unwrap();
        assert_eq!(m.hist1d_named("RAW").unwrap().integral(), 1.);
        assert!(matches!(
            m.fill_xy_raw(55., 1., 1.),
            Err(MachineError::WrongDimension { expected: 2, found: 1 })
        ));
        assert!(m.hist2d(Channel::Raw).is_err());

        let mut m = MixMachine::new("dphi", MixMode::None, &config_2d()).unwrap();
        assert!(matches!(
            m.fill_x_raw(55., 1.),
            Err(MachineError::WrongDimension { expected: 1, found: 2 })
        ));
        m.fill_xy_named(55., 2., 1., "RAW").unwrap();
        assert_eq!(m.hist2d(Channel::Raw).unwrap().integral(), 1.);
        assert!(m.hist1d(Channel::Raw).is_err());
    }

    #[test]
    fn add_mismatch() {
        log_init();
        let mut m = machine(MixMode::Inclusive);
        m.fill_x_raw(55., 1.).unwrap();
        let orig = m.clone();

        let other = machine(MixMode::Multi);
        assert!(matches!(m.add(&other, DEFAULT_PRECISION), Err(MachineMismatch::Mode(..))));

        let other =
            MixMachine::new("photonPt", MixMode::Inclusive, &config_1d(true)).unwrap();
        assert!(matches!(m.add(&other, DEFAULT_PRECISION), Err(MachineMismatch::Mc(..))));

        let other = MixMachine::new("dphi", MixMode::Inclusive, &config_2d()).unwrap();
        assert!(matches!(
            m.add(&other, DEFAULT_PRECISION),
            Err(MachineMismatch::Dimension(..))
        ));

        let mut config = config_1d(false);
        config.set("BINSX", "50,60.1,80,120");
        let other = MixMachine::new("photonPt", MixMode::Inclusive, &config).unwrap();
        assert_eq!(
            m.check_match_bins(&other, 0.01),
            Err(MachineMismatch::Edge {
                axis: 'x',
                edge: 1,
                lhs: 60.,
                rhs: 60.1,
                precision: 0.01
            })
        );
        assert!(m.add(&other, 0.01).is_err());
        assert!(m.check_match_bins(&other, 0.2).is_ok());

        config.set("NBINSX", "2").set("BINSX", "50,60,80");
        let other = MixMachine::new("photonPt", MixMode::Inclusive, &config).unwrap();
        assert!(matches!(
            m.add(&other, DEFAULT_PRECISION),
            Err(MachineMismatch::NBins { axis: 'x', .. })
        ));

        // one good and one bad machine must not add anything
        let good = machine(MixMode::Inclusive);
        let bad = machine(MixMode::None);
        assert!(m.add_two(&good, &bad, DEFAULT_PRECISION).is_err());
        assert!(m.add(&MixMachine::default(), DEFAULT_PRECISION).is_err());

        assert_eq!(m, orig);
    }

    #[test]
    fn add() {
        log_init();
        let mut m = machine(MixMode::Multi);
        let mut other = machine(MixMode::Multi);
        m.fill_x_mix(70., 1.).unwrap();
        other.fill_x_mix(70., 1.).unwrap();
        m.add(&other, DEFAULT_PRECISION).unwrap();
        let mix = m.hist1d(Channel::Mix).unwrap();
        assert_close(mix.bin_content(2).unwrap(), 2.);
        assert_close(mix.bin_error(2).unwrap(), 2f64.sqrt());

        let mut third = machine(MixMode::Multi);
        third.fill_x_raw(55., 3.).unwrap();
        m.add_two(&other, &third, DEFAULT_PRECISION).unwrap();
        assert_close(m.hist1d(Channel::Mix).unwrap().bin_content(2).unwrap(), 3.);
        assert_close(m.hist1d(Channel::Raw).unwrap().bin_content(1).unwrap(), 3.);
    }

    #[test]
    fn add_2d() {
        log_init();
        let mut m = MixMachine::new("dphi", MixMode::None, &config_2d()).unwrap();
        let mut other = m.clone();
        m.fill_xy_raw(55., 2., 1.).unwrap();
        other.fill_xy_raw(55., 2., 1.).unwrap();
        m.add(&other, DEFAULT_PRECISION).unwrap();
        let raw = m.hist2d(Channel::Raw).unwrap();
        assert_close(raw.bin_content(raw.bin(1, 2).unwrap()).unwrap(), 2.);
    }

    #[test]
    fn write() {
        log_init();
        let mut m = machine(MixMode::Inclusive);
        m.fill_x_raw(55., 1.).unwrap();
        let mut dir = Directory::new("out");
        m.write_to(&mut dir).unwrap();
        assert_eq!(dir.len(), 3);

        // overwrite with new contents
        m.fill_x_raw(55., 1.).unwrap();
        m.write_to(&mut dir).unwrap();
        assert_eq!(dir.len(), 3);
        let raw = dir.get("photonPt_MIXMODE1_RAW_h").unwrap();
        assert_eq!(raw.integral(), 2.);
    }

    #[test]
    fn clean() {
        log_init();
        let mut m = machine(MixMode::Multi);
        m.clean();
        assert!(!m.is_init());
        assert!(m.channels().is_empty());
        assert_eq!(m.x_edges(), None);
        assert!(matches!(m.compute_sub(), Err(MachineError::NotInit)));
        let mut dir = Directory::new("out");
        assert!(matches!(m.write_to(&mut dir), Err(WriteError::NotInit)));
        assert!(dir.is_empty());
        let path = std::env::temp_dir().join("gammajet_never_written.yaml");
        assert!(matches!(
            m.write_to_file(&path, None),
            Err(WriteError::NotInit)
        ));
        assert!(!path.exists());
    }

    #[test]
    fn add_mismatch_y() {
        log_init();
        let mut m = MixMachine::new("dphi", MixMode::Inclusive, &config_2d()).unwrap();
        m.fill_xy_raw(55., 2., 1.).unwrap();
        let orig = m.clone();

        let mut config = config_2d();
        config.set("BINSY", "0 1.6 3.14159");
        let other = MixMachine::new("dphi", MixMode::Inclusive, &config).unwrap();
        assert!(m.check_match_bins(&other, DEFAULT_PRECISION).is_err());
        assert_eq!(
            m.add(&other, DEFAULT_PRECISION),
            Err(MachineMismatch::Edge {
                axis: 'y',
                edge: 1,
                lhs: 1.5,
                rhs: 1.6,
                precision: DEFAULT_PRECISION
            })
        );
        assert!(m.check_match_bins(&other, 0.2).is_ok());

        config.set("NBINSY", "3").set("BINSY", "0 1 2 3.14159");
        let other = MixMachine::new("dphi", MixMode::Inclusive, &config).unwrap();
        assert!(matches!(
            m.add(&other, DEFAULT_PRECISION),
            Err(MachineMismatch::NBins { axis: 'y', lhs: 2, rhs: 3 })
        ));

        assert_eq!(m, orig);
    }

    #[test]
    fn deserialise_validates() {
        log_init();
        let mut m = machine(MixMode::None);
        m.fill_x_raw(55., 1.).unwrap();
        let yaml = serde_yaml::to_string(&m).unwrap();
        let back: MixMachine = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, m);
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        // RAW loses one cell
        let mut corrupt = value.clone();
        corrupt["hists"][0]["sumw"]
            .as_sequence_mut()
            .unwrap()
            .pop();
        assert!(serde_yaml::from_value::<MixMachine>(corrupt).is_err());

        // active channels without histograms
        let mut corrupt = value.clone();
        corrupt["mode"] = serde_yaml::to_value(MixMode::Multi).unwrap();
        assert!(serde_yaml::from_value::<MixMachine>(corrupt).is_err());

        // histograms in an uninitialised machine
        let mut corrupt = value.clone();
        corrupt["is_init"] = serde_yaml::Value::Bool(false);
        assert!(serde_yaml::from_value::<MixMachine>(corrupt).is_err());

        // dimension flag disagrees with the histograms
        let mut corrupt = value.clone();
        corrupt["is_2d"] = serde_yaml::Value::Bool(true);
        assert!(serde_yaml::from_value::<MixMachine>(corrupt).is_err());

        // SUB with a different binning than RAW
        let mut corrupt = value;
        corrupt["hists"][Channel::Sub.idx()]["x"]["edges"][1] =
            serde_yaml::Value::from(61.);
        assert!(serde_yaml::from_value::<MixMachine>(corrupt).is_err());

        let empty = serde_yaml::to_string(&MixMachine::default()).unwrap();
        assert_eq!(
            serde_yaml::from_str::<MixMachine>(&empty).unwrap(),
            MixMachine::default()
        );
    }
}
