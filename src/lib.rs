//! `gammajet` holds the bookkeeping core of a gamma+jet measurement:
//!
//! - [flattener] maps two-dimensional bin indices onto a single
//!   contiguous index and back
//! - [mix_machine] manages the raw, mixed-event, and truth histograms of
//!   one observable and derives the background-subtracted signal
//!
//! # How to use
//!
//! ```no_run
//! use gammajet::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file("photonPt.config")?;
//! let mut machine = MixMachine::new("photonPt", MixMode::Inclusive, &config)?;
//! machine.fill_x_raw(62.3, 1.)?;
//! machine.fill_x_mix(71.0, 0.25)?;
//! machine.compute_sub()?;
//! machine.write_to_file("photonPt.yaml", None)?;
//! # Ok(())
//! # }
//! ```
//!
//! Partial results from separate jobs are combined with
//! [MixMachine::add](mix_machine::MixMachine::add), a
//! [Merger](merge::Merger), or the `gammajet-merge` executable.

/// Mixing modes and histogram channels
pub mod channel;
/// Output compression
pub mod compression;
/// Key-value configuration
pub mod config;
/// In-memory histogram collection
pub mod directory;
/// On-disk object storage
pub mod file;
/// Flattening of two-dimensional binnings
pub mod flattener;
/// Weighted histograms
pub mod histogram;
/// Combination of machines from separate jobs
pub mod merge;
/// Raw, mixed-event, and truth histograms of one observable
pub mod mix_machine;
/// Most important exports
pub mod prelude;
/// Progress bar
pub mod progress_bar;
/// Common traits
pub mod traits;

mod parsing;

use lazy_static::lazy_static;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
lazy_static! {
    pub static ref VERSION_MAJOR: u32 =
        env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap();
    pub static ref VERSION_MINOR: u32 =
        env!("CARGO_PKG_VERSION_MINOR").parse().unwrap();
    pub static ref VERSION_PATCH: u32 =
        env!("CARGO_PKG_VERSION_PATCH").parse().unwrap();
}
pub const GIT_REV: Option<&str> = option_env!("VERGEN_GIT_SHA");
pub const GIT_BRANCH: Option<&str> = option_env!("VERGEN_GIT_BRANCH");
