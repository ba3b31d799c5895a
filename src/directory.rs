use std::collections::BTreeMap;
use std::convert::Infallible;

use log::trace;

use crate::histogram::Histogram;
use crate::traits::WriteObject;

/// In-memory collection of named histograms
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Directory {
    name: String,
    objects: BTreeMap<String, Histogram>,
}

impl Directory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&Histogram> {
        self.objects.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Histogram> {
        self.objects.remove(name)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Histograms ordered by name
    pub fn iter(&self) -> impl Iterator<Item = &Histogram> {
        self.objects.values()
    }
}

impl WriteObject for Directory {
    type Error = Infallible;

    fn write_object(&mut self, hist: &Histogram) -> Result<(), Self::Error> {
        trace!("Writing {} to directory {}", hist.name(), self.name);
        self.objects.insert(hist.name().to_owned(), hist.clone());
        Ok(())
    }
}
