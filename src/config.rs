use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
    str::FromStr,
};

use audec::auto_decompress;
use log::debug;
use thiserror::Error;

use crate::parsing::{double_list, env_entry};

/// Flat key-value configuration
///
/// The text format follows ROOT's `TEnv`: one `Key: value` pair per line,
/// lines starting with `#` are comments. If a key appears more than once
/// the last value wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    entries: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a configuration file
    ///
    /// Compressed files are decompressed automatically.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let read_err = |err| ConfigError::Read(path.to_owned(), err);
        let file = File::open(path).map_err(read_err)?;
        let mut text = String::new();
        auto_decompress(BufReader::new(file))
            .read_to_string(&mut text)
            .map_err(read_err)?;
        let config = text.parse::<Config>()?;
        debug!("Read {} entries from {path:?}", config.len());
        Ok(config)
    }

    /// Set `key` to `value`, replacing any previous value
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Check that all `keys` are present
    ///
    /// The error lists every missing key.
    pub fn check_keys(&self, keys: &[&str]) -> Result<(), ConfigError> {
        let missing: Vec<_> = keys
            .iter()
            .filter(|k| !self.contains(k))
            .map(|k| k.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingKeys(missing))
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ConfigError> {
        self.entries
            .get(key)
            .map(|v| v.as_str())
            .ok_or_else(|| ConfigError::MissingKeys(vec![key.to_owned()]))
    }

    /// Boolean value
    ///
    /// Accepts `true`, `yes`, `on`, `false`, `no`, `off` in any case, as
    /// well as integers, where everything but zero is `true`.
    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        let val = self.get_str(key)?;
        match val.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Ok(true),
            "false" | "no" | "off" => Ok(false),
            other => other
                .parse::<i64>()
                .map(|i| i != 0)
                .map_err(|_| self.invalid(key, val, "a boolean")),
        }
    }

    pub fn get_usize(&self, key: &str) -> Result<usize, ConfigError> {
        let val = self.get_str(key)?;
        val.parse()
            .map_err(|_| self.invalid(key, val, "a non-negative integer"))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, ConfigError> {
        let val = self.get_str(key)?;
        val.parse().map_err(|_| self.invalid(key, val, "a number"))
    }

    /// List of numbers, separated by commas and/or whitespace
    pub fn get_f64_list(&self, key: &str) -> Result<Vec<f64>, ConfigError> {
        let val = self.get_str(key)?;
        double_list(val)
            .map(|(_, list)| list)
            .map_err(|_| self.invalid(key, val, "a list of numbers"))
    }

    fn invalid(&self, key: &str, value: &str, expected: &'static str) -> ConfigError {
        ConfigError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
            expected,
        }
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Config::new();
        for (nline, line) in s.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (_, (key, value)) = env_entry(trimmed).map_err(|_| {
                ConfigError::Syntax {
                    line: nline + 1,
                    content: line.to_owned(),
                }
            })?;
            config.set(key, value);
        }
        Ok(config)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Config {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { entries }
    }
}

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from {0:?}")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("Syntax error in line {line}: '{content}'")]
    Syntax { line: usize, content: String },
    #[error("Missing configuration keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
    #[error("Value '{value}' of {key} is not {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
    #[error("{key} has {nbins} bins, but {edges_key} lists {nedges} edges")]
    BinCount {
        key: &'static str,
        nbins: usize,
        edges_key: &'static str,
        nedges: usize,
    },
    #[error("Invalid binning {key}: {source}")]
    Binning {
        key: &'static str,
        source: crate::histogram::AxisError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    const EXAMPLE: &str = "# photon pt binning
IS2DUNFOLD: 0
ISMC: yes
NBINSX: 3
BINSX: 50, 60,80  120
TITLEX: p_{T}^{#gamma} [GeV]

NBINSX: 4
";

    #[test]
    fn parse() {
        let config: Config = EXAMPLE.parse().unwrap();
        assert_eq!(config.len(), 5);
        assert!(!config.get_bool("IS2DUNFOLD").unwrap());
        assert!(config.get_bool("ISMC").unwrap());
        assert_eq!(config.get_usize("NBINSX").unwrap(), 4);
        assert_eq!(
            config.get_f64_list("BINSX").unwrap(),
            vec![50., 60., 80., 120.]
        );
        assert_eq!(config.get_str("TITLEX").unwrap(), "p_{T}^{#gamma} [GeV]");
    }

    #[test]
    fn errors() {
        assert!(matches!(
            "A: 1\nnot a pair".parse::<Config>(),
            Err(ConfigError::Syntax { line: 2, .. })
        ));

        let config: Config = [("A", "maybe"), ("B", "-1"), ("C", "1,x")]
            .into_iter()
            .collect();
        assert!(matches!(
            config.get_bool("A"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(config.get_bool("B").unwrap());
        assert!(config.get_usize("B").is_err());
        assert!(config.get_f64_list("C").is_err());
        match config.check_keys(&["A", "X", "Y"]) {
            Err(ConfigError::MissingKeys(keys)) => assert_eq!(keys, ["X", "Y"]),
            res => panic!("unexpected result {res:?}"),
        }
    }

    #[test]
    fn read_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXAMPLE.as_bytes()).unwrap();
        file.flush().unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config, EXAMPLE.parse::<Config>().unwrap());
        assert!(Config::from_file("/nonexistent/config.txt").is_err());
    }
}
