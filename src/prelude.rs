pub use crate::{
    channel::{Channel, MixMode},
    config::Config,
    directory::Directory,
    file::ObjectFile,
    flattener::BinFlattener,
    histogram::{Axis, Histogram},
    merge::Merger,
    mix_machine::{MixMachine, DEFAULT_PRECISION},
    traits::WriteObject,
};
