//! Pluggable compression for byte-stream formats.
//!
//! Formats that write a plain byte stream (the pickle-style snapshot and JSON) can be
//! compressed transparently. The choice is expressed with [`Compression`]:
//!
//! - [`Compression::Infer`] (the default) picks a codec from the file extension, and
//!   on reads falls back to the stream's magic bytes;
//! - [`Compression::None`] disables compression;
//! - [`Compression::Codec`] names a codec explicitly (`"gzip"`, `"zstd"`, `"bz2"`, `"xz"`).
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags, the following codecs are available:
//! - **Gzip** (`.gz`) - via `flate2` crate (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` crate (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` crate (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` crate (feature: `compression-xz`)
//!
//! Naming a codec whose feature is disabled is a configuration error, reported when
//! the option is parsed rather than when the file is opened.

use crate::error::AdapterError;
use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Compression codec trait.
///
/// Codecs are detected via file extensions (fast path) or magic bytes (fallback),
/// or selected by [`name`](CompressionCodec::name).
pub trait CompressionCodec: Send + Sync {
    /// Canonical codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &'static str;

    /// Other names accepted when selecting the codec explicitly.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// File extensions associated with this codec, lowercase with the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Optional magic byte signature for content-based detection.
    fn magic_bytes(&self) -> Option<&'static [u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;

    /// Wrap a writer with compression.
    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>>;
}

/// A writer whose stream must be closed explicitly.
///
/// Encoders write their trailer in [`finish`](FinishWrite::finish); dropping one
/// instead discards any error from that last write.
pub trait FinishWrite: Write {
    /// Write any trailer and flush the underlying sink.
    ///
    /// # Errors
    /// Returns the I/O error of the final writes.
    fn finish(self: Box<Self>) -> std::io::Result<()>;
}

impl<W: Write> FinishWrite for BufWriter<W> {
    fn finish(mut self: Box<Self>) -> std::io::Result<()> {
        self.flush()
    }
}

/// Codecs compiled into this build.
#[must_use]
pub fn builtin_codecs() -> Vec<&'static dyn CompressionCodec> {
    vec![
        #[cfg(feature = "compression-gzip")]
        &GzipCodec,
        #[cfg(feature = "compression-zstd")]
        &ZstdCodec,
        #[cfg(feature = "compression-bzip2")]
        &Bzip2Codec,
        #[cfg(feature = "compression-xz")]
        &XzCodec,
    ]
}

/// Find a built-in codec by name or alias (case-insensitive).
#[must_use]
pub fn codec_by_name(name: &str) -> Option<&'static dyn CompressionCodec> {
    let name = name.to_ascii_lowercase();
    builtin_codecs()
        .into_iter()
        .find(|c| c.name() == name || c.aliases().contains(&name.as_str()))
}

/// How a byte stream is (de)compressed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Compression {
    /// Detect from the extension (and, on reads, from magic bytes).
    #[default]
    Infer,
    /// Never compress.
    None,
    /// Always use the named codec.
    Codec(&'static str),
}

impl TryFrom<String> for Compression {
    type Error = AdapterError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match raw.to_ascii_lowercase().as_str() {
            "infer" => Ok(Self::Infer),
            "none" | "" => Ok(Self::None),
            other => codec_by_name(other)
                .map(|c| Self::Codec(c.name()))
                .ok_or_else(|| AdapterError::invalid(format!("unknown compression codec '{raw}'"))),
        }
    }
}

impl<'de> Deserialize<'de> for Compression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::try_from(raw).map_err(de::Error::custom)
    }
}

impl From<Compression> for String {
    fn from(c: Compression) -> Self {
        c.to_string()
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infer => f.write_str("infer"),
            Self::None => f.write_str("none"),
            Self::Codec(name) => f.write_str(name),
        }
    }
}

/// Detect compression codec from file path extension.
///
/// Matching is case-insensitive and handles multiple extensions (e.g., `.json.gz`).
fn detect_from_extension(path: impl AsRef<Path>) -> Option<&'static dyn CompressionCodec> {
    let path_str = path.as_ref().to_string_lossy().to_lowercase();
    builtin_codecs()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| path_str.ends_with(ext)))
}

/// Detect compression codec from magic bytes at the start of a stream.
///
/// The reader is not advanced.
fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<&'static dyn CompressionCodec> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    builtin_codecs().into_iter().find(|codec| {
        codec
            .magic_bytes()
            .is_some_and(|magic| buf.len() >= magic.len() && buf.starts_with(magic))
    })
}

fn resolve(compression: &Compression) -> Option<&'static dyn CompressionCodec> {
    match compression {
        Compression::Codec(name) => codec_by_name(name),
        Compression::Infer | Compression::None => None,
    }
}

/// Wrap `reader` for decompression according to `compression`.
///
/// With [`Compression::Infer`] the extension of `path_hint` is checked first, then the
/// stream's magic bytes; an unrecognized stream is returned as-is.
///
/// # Errors
/// Returns an error if the codec fails to initialize on the stream.
pub fn reader_for<R: Read + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
    compression: &Compression,
) -> Result<Box<dyn Read>> {
    let codec = match compression {
        Compression::None => return Ok(Box::new(BufReader::new(reader))),
        Compression::Codec(_) => resolve(compression),
        Compression::Infer => detect_from_extension(&path_hint),
    };
    if let Some(codec) = codec {
        return codec
            .wrap_reader_dyn(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    let mut buf_reader = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buf_reader) {
        return codec
            .wrap_reader_dyn(Box::new(buf_reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }
    Ok(Box::new(buf_reader))
}

/// Wrap `writer` for compression according to `compression`.
///
/// With [`Compression::Infer`] detection is based solely on the extension of
/// `path_hint`. Call [`FinishWrite::finish`] on the returned writer once the
/// payload is written.
///
/// # Errors
/// Returns an error if the codec fails to initialize.
pub fn writer_for<W: Write + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
    compression: &Compression,
) -> Result<Box<dyn FinishWrite>> {
    let codec = match compression {
        Compression::None => None,
        Compression::Codec(_) => resolve(compression),
        Compression::Infer => detect_from_extension(&path_hint),
    };
    if let Some(codec) = codec {
        return codec
            .wrap_writer_dyn(Box::new(writer))
            .with_context(|| format!("wrap writer with {} codec", codec.name()));
    }
    Ok(Box::new(BufWriter::new(writer)))
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["gz"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use flate2::read::MultiGzDecoder;
        Ok(Box::new(MultiGzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-gzip")]
impl<W: Write> FinishWrite for flate2::write::GzEncoder<W> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        (*self).finish()?.flush()
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["zst"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>> {
        zstd::stream::write::Encoder::new(writer, 3).map(|e| Box::new(e) as Box<dyn FinishWrite>)
    }
}

#[cfg(feature = "compression-zstd")]
impl<W: Write> FinishWrite for zstd::stream::write::Encoder<'static, W> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        (*self).finish()?.flush()
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &'static str {
        "bz2"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["bzip2"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(b"BZh")
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use bzip2::read::BzDecoder;
        Ok(Box::new(BzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>> {
        use bzip2::write::BzEncoder;
        use bzip2::Compression;
        Ok(Box::new(BzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-bzip2")]
impl<W: Write> FinishWrite for bzip2::write::BzEncoder<W> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        (*self).finish()?.flush()
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &'static str {
        "xz"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use xz2::read::XzDecoder;
        Ok(Box::new(XzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>> {
        use xz2::write::XzEncoder;
        Ok(Box::new(XzEncoder::new(writer, 6)))
    }
}

#[cfg(feature = "compression-xz")]
impl<W: Write> FinishWrite for xz2::write::XzEncoder<W> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        (*self).finish()?.flush()
    }
}
