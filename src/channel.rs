use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator};

/// Mixed-event background estimation mode
#[derive(Deserialize, Serialize)]
#[derive(
    Copy, Clone, Debug, Default, Display, EnumString, EnumIter, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
#[strum(ascii_case_insensitive)]
#[strum(serialize_all = "UPPERCASE")]
pub enum MixMode {
    /// No mixed-event background
    #[default]
    None,
    /// A single inclusive mixed-event background
    Inclusive,
    /// Mixed-event background with a secondary correction
    Multi,
}

impl MixMode {
    /// Integer code used in histogram names
    pub fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Inclusive => 1,
            Self::Multi => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::iter().find(|m| m.code() == code)
    }

    /// Active channels, in a fixed order
    ///
    /// Truth channels are only included for Monte Carlo.
    pub fn channels(self, is_mc: bool) -> Vec<Channel> {
        Channel::iter()
            .filter(|c| c.is_active(self, is_mc))
            .collect()
    }
}

/// A histogram slot of a [MixMachine](crate::mix_machine::MixMachine)
#[derive(Deserialize, Serialize)]
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    EnumCount,
    EnumIter,
    EnumString,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
)]
pub enum Channel {
    /// Same-event distribution
    #[strum(serialize = "RAW")]
    Raw,
    /// Mixed-event background estimate
    #[strum(serialize = "MIX")]
    Mix,
    /// Correction to the mixed-event background
    #[strum(serialize = "MIXCORRECTION")]
    MixCorrection,
    /// Mixed-event background after correction
    #[strum(serialize = "MIXCORRECTED")]
    MixCorrected,
    /// Background-subtracted signal
    #[strum(serialize = "SUB")]
    Sub,
    #[strum(serialize = "TRUTH")]
    Truth,
    #[strum(serialize = "TRUTHMATCHEDRECO")]
    TruthMatchedReco,
}

impl Channel {
    /// Whether the channel exists for the given mode
    pub fn is_active(self, mode: MixMode, is_mc: bool) -> bool {
        use Channel::*;
        match self {
            Raw | Sub => true,
            Mix => mode != MixMode::None,
            MixCorrection | MixCorrected => mode == MixMode::Multi,
            Truth | TruthMatchedReco => is_mc,
        }
    }

    pub(crate) fn idx(self) -> usize {
        self as usize
    }
}
