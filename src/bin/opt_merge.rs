use std::path::PathBuf;

use clap::Parser;
use gammajet::compression::Compression;
use gammajet::mix_machine::DEFAULT_PRECISION;

#[derive(Debug, Parser)]
#[clap(about, author, version)]
pub(crate) struct Opt {
    /// Output file.
    ///
    /// Merged machines and all their channel histograms are written
    /// to this file. An existing file is replaced.
    #[clap(long, short, value_parser)]
    pub(crate) outfile: PathBuf,

    /// Only merge the machine with the given name.
    ///
    /// By default all machines found in the input files are merged,
    /// combining machines with the same name.
    #[clap(long, short)]
    pub(crate) name: Option<String>,

    /// Compute the background-subtracted histograms after merging.
    #[clap(long)]
    pub(crate) compute_sub: bool,

    /// Maximum difference between bin edges of merged machines.
    #[clap(long, default_value_t = DEFAULT_PRECISION)]
    pub(crate) precision: f64,

    #[clap(
        short,
        long,
        help = "Compress output file.
Possible settings are 'bzip2', 'gzip', 'zstd', 'lz4'.
Compression levels can be set with algorithm_level e.g. 'zstd_5'.
Maximum levels are 'gzip_9', 'zstd_19', 'lz4_16'."
    )]
    pub(crate) compression: Option<Compression>,

    /// Verbosity level
    #[clap(
        short,
        long,
        default_value = "Info",
        help = "Verbosity level.
Possible values with increasing amount of output are
'off', 'error', 'warn', 'info', 'debug', 'trace'.\n"
    )]
    pub(crate) loglevel: String,

    /// Input files with machines from separate jobs.
    #[clap(name = "INFILES", value_parser, required = true)]
    pub(crate) infiles: Vec<PathBuf>,
}
