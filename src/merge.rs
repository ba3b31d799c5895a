use std::collections::btree_map::{BTreeMap, Entry};
use std::convert::Infallible;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::file::{ObjectFile, ObjectFileError};
use crate::mix_machine::{
    MachineError, MachineMismatch, MixMachine, WriteError, DEFAULT_PRECISION,
};

/// Combine machines from the output files of separate jobs
///
/// Machines with the same name are added up with
/// [MixMachine::add](crate::mix_machine::MixMachine::add).
#[derive(Clone, Debug, PartialEq)]
pub struct Merger {
    name: Option<String>,
    precision: f64,
    merged: BTreeMap<String, MixMachine>,
}

impl Default for Merger {
    fn default() -> Self {
        Self {
            name: None,
            precision: DEFAULT_PRECISION,
            merged: BTreeMap::new(),
        }
    }
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only merge the machine with the given name
    ///
    /// Every input file then has to contain this machine.
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Maximum difference between bin edges of merged machines
    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    /// Merge the machines in the file at `path`
    ///
    /// Returns the number of machines read from the file. If any machine
    /// is incompatible with the ones merged so far, nothing from this file
    /// is added.
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, MergeError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(MergeError::Missing(path.to_owned()));
        }
        let file = ObjectFile::open(path)?;
        let machines: Vec<&MixMachine> = match &self.name {
            Some(name) => {
                let machine = file.machine(name).ok_or_else(|| {
                    MergeError::NoSuchMachine {
                        name: name.to_owned(),
                        path: path.to_owned(),
                    }
                })?;
                vec![machine]
            }
            None => file.machines().collect(),
        };
        for machine in &machines {
            if !machine.is_init() {
                return Err(MergeError::NotInit {
                    name: machine.name().to_owned(),
                    path: path.to_owned(),
                });
            }
            if let Some(merged) = self.merged.get(machine.name()) {
                merged.check_matches(machine, self.precision).map_err(|source| {
                    MergeError::Mismatch {
                        name: machine.name().to_owned(),
                        path: path.to_owned(),
                        source,
                    }
                })?;
            }
        }
        for machine in &machines {
            match self.merged.entry(machine.name().to_owned()) {
                Entry::Vacant(entry) => {
                    debug!("Found machine {} in {path:?}", machine.name());
                    entry.insert((*machine).clone());
                }
                Entry::Occupied(mut entry) => {
                    entry.get_mut().add(machine, self.precision).map_err(
                        |source| MergeError::Mismatch {
                            name: machine.name().to_owned(),
                            path: path.to_owned(),
                            source,
                        },
                    )?;
                }
            }
        }
        Ok(machines.len())
    }

    /// Compute the background-subtracted histograms of all merged machines
    pub fn compute_sub(&mut self) -> Result<(), MergeError> {
        for machine in self.merged.values_mut() {
            machine.compute_sub().map_err(|source| MergeError::Sub {
                name: machine.name().to_owned(),
                source,
            })?;
        }
        Ok(())
    }

    /// Merged machine with the given name
    pub fn machine(&self, name: &str) -> Option<&MixMachine> {
        self.merged.get(name)
    }

    /// All merged machines, ordered by name
    pub fn machines(&self) -> impl Iterator<Item = &MixMachine> {
        self.merged.values()
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    /// Store all merged machines and their channel histograms in `out`
    pub fn write_to(&self, out: &mut ObjectFile) -> Result<(), MergeError> {
        for machine in self.merged.values() {
            out.put_machine(machine);
            machine.write_to(out).map_err(|source| MergeError::Write {
                name: machine.name().to_owned(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Error merging machines from several files
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Input file {0:?} does not exist")]
    Missing(PathBuf),
    #[error(transparent)]
    File(#[from] ObjectFileError),
    #[error("Machine {name} in {path:?} is not initialised")]
    NotInit { name: String, path: PathBuf },
    #[error("No machine {name} in {path:?}")]
    NoSuchMachine { name: String, path: PathBuf },
    #[error("Failed to merge machine {name} from {path:?}")]
    Mismatch {
        name: String,
        path: PathBuf,
        #[source]
        source: MachineMismatch,
    },
    #[error("Failed to write machine {name}")]
    Write {
        name: String,
        #[source]
        source: WriteError<Infallible>,
    },
    #[error("Failed to subtract background for {name}")]
    Sub {
        name: String,
        #[source]
        source: MachineError,
    },
}
