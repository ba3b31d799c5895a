use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use audec::auto_decompress;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compression::{compress_writer, Compression};
use crate::histogram::Histogram;
use crate::mix_machine::MixMachine;
use crate::traits::WriteObject;

/// An object stored in an [ObjectFile]
#[derive(Deserialize, Serialize)]
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    Histogram(Histogram),
    Machine(MixMachine),
}

/// File holding named histograms and machines
///
/// Objects are kept in memory and written out as YAML with
/// [save](Self::save). Compressed files are recognised automatically when
/// reading.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectFile {
    path: PathBuf,
    compression: Option<Compression>,
    objects: BTreeMap<String, Object>,
}

impl ObjectFile {
    /// Open the file at `path`, loading all objects if it already exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ObjectFileError> {
        let path = path.as_ref().to_owned();
        if !path.exists() {
            debug!("{path:?} does not exist yet, starting with empty file");
            return Ok(Self::create(path));
        }
        let file = File::open(&path)
            .map_err(|err| ObjectFileError::Open(path.clone(), err))?;
        let reader = auto_decompress(BufReader::new(file));
        let objects: BTreeMap<String, Object> = serde_yaml::from_reader(reader)
            .map_err(|err| ObjectFileError::Parse(path.clone(), err))?;
        debug!("Read {} objects from {path:?}", objects.len());
        Ok(Self {
            path,
            compression: None,
            objects,
        })
    }

    /// An empty file at `path`, discarding any existing content on
    /// [save](Self::save)
    pub fn create<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_owned(),
            compression: None,
            objects: BTreeMap::new(),
        }
    }

    /// Set the compression used by [save](Self::save)
    pub fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&Object> {
        self.objects.get(name)
    }

    pub fn histogram(&self, name: &str) -> Option<&Histogram> {
        match self.objects.get(name) {
            Some(Object::Histogram(hist)) => Some(hist),
            _ => None,
        }
    }

    pub fn machine(&self, name: &str) -> Option<&MixMachine> {
        match self.objects.get(name) {
            Some(Object::Machine(machine)) => Some(machine),
            _ => None,
        }
    }

    /// All stored machines, ordered by name
    pub fn machines(&self) -> impl Iterator<Item = &MixMachine> {
        self.objects.values().filter_map(|obj| match obj {
            Object::Machine(machine) => Some(machine),
            Object::Histogram(_) => None,
        })
    }

    /// Names of all objects
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Store a machine under its name, replacing any object with that name
    pub fn put_machine(&mut self, machine: &MixMachine) {
        trace!("Storing machine {} in {:?}", machine.name(), self.path);
        self.objects
            .insert(machine.name().to_owned(), Object::Machine(machine.clone()));
    }

    /// Write all objects to disk
    pub fn save(&self) -> Result<(), ObjectFileError> {
        let write_err = |err| ObjectFileError::Write(self.path.clone(), err);
        let file = File::create(&self.path).map_err(write_err)?;
        let mut writer =
            compress_writer(BufWriter::new(file), self.compression)
                .map_err(write_err)?;
        serde_yaml::to_writer(&mut writer, &self.objects)
            .map_err(|err| ObjectFileError::Serialise(self.path.clone(), err))?;
        writer.finish().map_err(write_err)?;
        debug!("Wrote {} objects to {:?}", self.objects.len(), self.path);
        Ok(())
    }
}

impl WriteObject for ObjectFile {
    type Error = Infallible;

    fn write_object(&mut self, hist: &Histogram) -> Result<(), Self::Error> {
        trace!("Storing {} in {:?}", hist.name(), self.path);
        self.objects
            .insert(hist.name().to_owned(), Object::Histogram(hist.clone()));
        Ok(())
    }
}

/// Error reading or writing an [ObjectFile]
#[derive(Debug, Error)]
pub enum ObjectFileError {
    #[error("Failed to open {0:?}")]
    Open(PathBuf, #[source] io::Error),
    #[error("Failed to parse {0:?}")]
    Parse(PathBuf, #[source] serde_yaml::Error),
    #[error("Failed to write to {0:?}")]
    Write(PathBuf, #[source] io::Error),
    #[error("Failed to serialise objects for {0:?}")]
    Serialise(PathBuf, #[source] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::channel::{Channel, MixMode};
    use crate::config::Config;
    use crate::histogram::Axis;

    fn machine() -> MixMachine {
        let config: Config = [
            ("IS2DUNFOLD", "false"),
            ("ISMC", "false"),
            ("NBINSX", "2"),
            ("BINSX", "0, 1, 2"),
            ("TITLEX", "x"),
        ]
        .into_iter()
        .collect();
        let mut m = MixMachine::new("m", MixMode::Inclusive, &config).unwrap();
        m.fill_x_raw(0.5, 2.).unwrap();
        m.fill_x_mix(1.5, 1.).unwrap();
        m
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        for (name, compression) in [
            ("plain.yaml", None),
            ("gz.yaml.gz", Some(Compression::Gzip(6))),
            ("bz2.yaml.bz2", Some(Compression::Bzip2)),
            ("zstd.yaml.zst", Some(Compression::Zstd(0))),
        ] {
            let path = dir.path().join(name);
            let m = machine();
            let mut file = ObjectFile::create(&path).with_compression(compression);
            file.put_machine(&m);
            m.write_to(&mut file).unwrap();
            file.save().unwrap();

            let file = ObjectFile::open(&path).unwrap();
            assert_eq!(file.len(), 4);
            assert_eq!(file.machine("m"), Some(&m));
            assert_eq!(file.machines().count(), 1);
            assert_eq!(
                file.histogram("m_MIXMODE1_RAW_h"),
                m.hist1d(Channel::Raw).ok()
            );
            assert_eq!(file.histogram("m"), None);
        }
    }

    #[test]
    fn overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.yaml");

        let other = Histogram::new_1d("other", "", Axis::new(vec![0., 1.]).unwrap());
        let mut file = ObjectFile::open(&path).unwrap();
        assert!(file.is_empty());
        file.write_object(&other).unwrap();
        file.save().unwrap();

        let mut m = machine();
        m.write_to_file(&path, None).unwrap();
        m.fill_x_raw(0.5, 1.).unwrap();
        m.write_to_file(&path, None).unwrap();

        let file = ObjectFile::open(&path).unwrap();
        assert_eq!(file.len(), 4);
        assert!(file.histogram("other").is_some());
        let raw = file.histogram("m_MIXMODE1_RAW_h").unwrap();
        assert_eq!(raw.bin_content(1).unwrap(), 3.);
    }

    fn write_machine_value(path: &Path, machine: serde_yaml::Value) {
        use serde_yaml::value::{Mapping, Tag, TaggedValue, Value};

        let mut objects = Mapping::new();
        objects.insert(
            Value::from("m"),
            Value::Tagged(Box::new(TaggedValue {
                tag: Tag::new("Machine"),
                value: machine,
            })),
        );
        std::fs::write(path, serde_yaml::to_string(&objects).unwrap()).unwrap();
    }

    #[test]
    fn open_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupted.yaml");
        let mut value = serde_yaml::to_value(machine()).unwrap();
        write_machine_value(&path, value.clone());
        assert_eq!(ObjectFile::open(&path).unwrap().machine("m"), Some(&machine()));

        value["hists"][0]["sumw2"].as_sequence_mut().unwrap().pop();
        write_machine_value(&path, value);
        assert!(matches!(
            ObjectFile::open(&path),
            Err(ObjectFileError::Parse(..))
        ));
    }

    #[test]
    fn open_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invalid.yaml");
        std::fs::write(&path, "not: [a, map").unwrap();
        assert!(matches!(
            ObjectFile::open(&path),
            Err(ObjectFileError::Parse(..))
        ));
    }
}
