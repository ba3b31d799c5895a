use crate::histogram::Histogram;

/// Destination for named histograms
pub trait WriteObject {
    type Error;

    /// Store `hist` under its name, replacing any object with the same name
    fn write_object(&mut self, hist: &Histogram) -> Result<(), Self::Error>;
}

/// Progress indicator
pub trait Progress {
    fn inc(&self, i: u64);

    fn finish(&self);
}
