use std::io::{self, Write};
use std::str::FromStr;

use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

const GZIP_DEFAULT_LEVEL: u8 = 6;
const LZ4_DEFAULT_LEVEL: u8 = 0;
const ZSTD_DEFAULT_LEVEL: u8 = 0;

lazy_static! {
    static ref COMPRESSION_RE: Regex =
        Regex::new(r"^(?P<algo>[[:alnum:]]+)(?P<lvl>_\d+)?$").unwrap();
}

/// Compression format
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Compression {
    /// The bzip2 format
    Bzip2,
    /// The gzip format with compression level as associated value
    Gzip(u8),
    /// The lz4 format with compression level as associated value
    Lz4(u8),
    /// The zstd format with compression level as associated value
    Zstd(u8),
}

impl FromStr for Compression {
    type Err = ParseCompressionErr;

    /// Parse `ALGORITHM` or `ALGORITHM_LEVEL`, e.g. `gz` or `zstd_5`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Compression::*;
        use ParseCompressionErr::*;

        let lower_case = s.to_ascii_lowercase();
        let Some(captures) = COMPRESSION_RE.captures(&lower_case) else {
            return Err(UnknownAlgorithm(s.to_owned()));
        };
        let algo = &captures["algo"];
        let lvl = match captures.name("lvl") {
            Some(lvl) => {
                let lvl = lvl.as_str();
                let parsed = lvl[1..]
                    .parse::<u8>()
                    .map_err(|_| UnsupportedLevel(lvl.to_owned(), algo.to_owned()))?;
                Some((parsed, lvl))
            }
            None => None,
        };
        type MakeCompression = fn(u8) -> Compression;
        let (make, default, max) = match algo {
            "bzip2" | "bz2" => {
                return match lvl {
                    Some((_, lvl)) => {
                        Err(UnsupportedLevel(lvl.to_owned(), algo.to_owned()))
                    }
                    None => Ok(Bzip2),
                }
            }
            "gzip" | "gz" => (Gzip as MakeCompression, GZIP_DEFAULT_LEVEL, 9),
            "lz4" => (Lz4 as MakeCompression, LZ4_DEFAULT_LEVEL, 16),
            "zstd" | "zstandard" => (Zstd as MakeCompression, ZSTD_DEFAULT_LEVEL, 19),
            _ => return Err(UnknownAlgorithm(s.to_owned())),
        };
        match lvl {
            None => Ok(make(default)),
            Some((lvl, _)) if lvl <= max => Ok(make(lvl)),
            Some((_, lvl)) => Err(UnsupportedLevel(lvl.to_owned(), algo.to_owned())),
        }
    }
}

/// Error parsing a [Compression]
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ParseCompressionErr {
    #[error("Unknown compression algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("Level {0} not supported for {1} compression")]
    UnsupportedLevel(String, String),
}

/// Writer compressing to one of the supported formats
///
/// The compressed stream is only complete after [finish](Self::finish).
/// Dropping the writer instead silently discards errors from writing the
/// end of the stream.
pub enum CompressWriter<W: Write> {
    Plain(W),
    Bzip2(BzEncoder<W>),
    Gzip(GzEncoder<W>),
    Lz4(lz4::Encoder<W>),
    Zstd(zstd::Encoder<'static, W>),
}

impl<W: Write> CompressWriter<W> {
    /// Write the end of the compressed stream and flush the underlying
    /// writer
    pub fn finish(self) -> io::Result<W> {
        let mut writer = match self {
            Self::Plain(writer) => writer,
            Self::Bzip2(encoder) => encoder.finish()?,
            Self::Gzip(encoder) => encoder.finish()?,
            Self::Lz4(encoder) => {
                let (writer, res) = encoder.finish();
                res?;
                writer
            }
            Self::Zstd(encoder) => encoder.finish()?,
        };
        writer.flush()?;
        Ok(writer)
    }
}

impl<W: Write> Write for CompressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(writer) => writer.write(buf),
            Self::Bzip2(encoder) => encoder.write(buf),
            Self::Gzip(encoder) => encoder.write(buf),
            Self::Lz4(encoder) => encoder.write(buf),
            Self::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(writer) => writer.flush(),
            Self::Bzip2(encoder) => encoder.flush(),
            Self::Gzip(encoder) => encoder.flush(),
            Self::Lz4(encoder) => encoder.flush(),
            Self::Zstd(encoder) => encoder.flush(),
        }
    }
}

/// Convert into a writer that compresses to the given format
pub fn compress_writer<W: Write>(
    writer: W,
    compression: Option<Compression>,
) -> Result<CompressWriter<W>, io::Error> {
    let writer = match compression {
        Some(Compression::Bzip2) => CompressWriter::Bzip2(BzEncoder::new(
            writer,
            bzip2::Compression::best(),
        )),
        Some(Compression::Gzip(lvl)) => CompressWriter::Gzip(GzEncoder::new(
            writer,
            flate2::Compression::new(lvl.into()),
        )),
        Some(Compression::Lz4(lvl)) => {
            let encoder = lz4::EncoderBuilder::new()
                .level(lvl.into())
                .build(writer)?;
            CompressWriter::Lz4(encoder)
        }
        Some(Compression::Zstd(lvl)) => {
            CompressWriter::Zstd(zstd::Encoder::new(writer, lvl.into())?)
        }
        None => CompressWriter::Plain(writer),
    };
    Ok(writer)
}
