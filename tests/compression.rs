#![cfg(all(
    feature = "compression-gzip",
    feature = "compression-zstd",
    feature = "compression-bzip2",
    feature = "compression-xz"
))]

use anyhow::Result;
use ironadapt::adapters::DocumentOptions;
use ironadapt::io::compression::{
    builtin_codecs, codec_by_name, reader_for, writer_for, Compression, FinishWrite,
};
use ironadapt::io::json::JsonReadOptions;
use ironadapt::testing::TempDirPath;
use ironadapt::{error_kind, ErrorKind};
use serde_json::json;
use std::fs::{self, File};
use std::io::{self, Read, Write};

const PAYLOAD: &[u8] = b"id,name\n1,alice\n2,bob\n";

fn write_with(path: &str, compression: &Compression) -> Result<()> {
    let mut writer = writer_for(File::create(path)?, path, compression)?;
    writer.write_all(PAYLOAD)?;
    writer.finish()?;
    Ok(())
}

/// Accepts `room` bytes, then fails every write.
struct ShortSink {
    room: usize,
}

impl Write for ShortSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.room == 0 {
            return Err(io::Error::new(io::ErrorKind::StorageFull, "sink full"));
        }
        let n = buf.len().min(self.room);
        self.room -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn read_with(path: &str, compression: &Compression) -> Result<Vec<u8>> {
    let mut reader = reader_for(File::open(path)?, path, compression)?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

#[test]
fn codecs_are_found_by_name_and_alias() {
    let names: Vec<&str> = builtin_codecs().iter().map(|c| c.name()).collect();
    assert_eq!(names, ["gzip", "zstd", "bz2", "xz"]);

    assert_eq!(codec_by_name("GZ").map(|c| c.name()), Some("gzip"));
    assert_eq!(codec_by_name("zst").map(|c| c.name()), Some("zstd"));
    assert_eq!(codec_by_name("bzip2").map(|c| c.name()), Some("bz2"));
    assert!(codec_by_name("snappy").is_none());
}

#[test]
fn compression_option_parsing() -> Result<()> {
    assert_eq!(serde_json::from_value::<Compression>(json!("infer"))?, Compression::Infer);
    assert_eq!(serde_json::from_value::<Compression>(json!("none"))?, Compression::None);
    assert_eq!(
        serde_json::from_value::<Compression>(json!("gz"))?,
        Compression::Codec("gzip")
    );
    assert_eq!(serde_json::to_value(Compression::Codec("xz"))?, json!("xz"));

    let err = Compression::try_from("lzo".to_string()).unwrap_err();
    assert_eq!(error_kind(&err.into()), Some(ErrorKind::InvalidParameter));
    Ok(())
}

#[test]
fn extension_selects_the_codec() -> Result<()> {
    let dir = TempDirPath::new()?;
    let cases: [(&str, &[u8]); 4] = [
        ("a.csv.gz", &[0x1f, 0x8b]),
        ("a.csv.zst", &[0x28, 0xb5, 0x2f, 0xfd]),
        ("a.csv.bz2", b"BZh"),
        ("a.csv.xz", &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]),
    ];
    for (file, magic) in cases {
        let path = dir.file(file);
        write_with(&path, &Compression::Infer)?;
        assert!(fs::read(&path)?.starts_with(magic), "{file} lacks its magic bytes");
        assert_eq!(read_with(&path, &Compression::Infer)?, PAYLOAD);
    }
    Ok(())
}

#[test]
fn magic_bytes_detect_compression_without_extension() -> Result<()> {
    let dir = TempDirPath::new()?;
    for codec in ["gzip", "zstd", "bz2", "xz"] {
        let path = dir.file(&format!("blob-{codec}"));
        write_with(&path, &Compression::Codec(codec))?;
        assert_ne!(fs::read(&path)?, PAYLOAD);
        assert_eq!(read_with(&path, &Compression::Infer)?, PAYLOAD);
    }
    Ok(())
}

#[test]
fn plain_streams_pass_through() -> Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file("plain.csv");
    write_with(&path, &Compression::Infer)?;
    assert_eq!(fs::read(&path)?, PAYLOAD);
    assert_eq!(read_with(&path, &Compression::Infer)?, PAYLOAD);

    // An explicit `none` wins over a misleading extension.
    let path = dir.file("raw.gz");
    write_with(&path, &Compression::None)?;
    assert_eq!(fs::read(&path)?, PAYLOAD);
    assert_eq!(read_with(&path, &Compression::None)?, PAYLOAD);
    Ok(())
}

#[test]
fn options_embedding_compression_deserialize() -> Result<()> {
    let options: DocumentOptions =
        serde_json::from_value(json!({ "compression": "GZ", "indent": 2 }))?;
    assert_eq!(options.compression, Compression::Codec("gzip"));
    assert_eq!(options.indent, 2);

    let options: JsonReadOptions = serde_json::from_value(json!({ "compression": "none" }))?;
    assert_eq!(options.compression, Compression::None);

    let err = serde_json::from_value::<DocumentOptions>(json!({ "compression": "lzo" }))
        .unwrap_err();
    assert!(err.to_string().contains("unknown compression codec 'lzo'"));
    Ok(())
}

#[test]
fn trailer_write_failures_are_reported() -> Result<()> {
    for codec in ["gzip", "zstd", "bz2", "xz"] {
        // Room for a stream header, not for the compressed body.
        let mut writer = writer_for(ShortSink { room: 10 }, "", &Compression::Codec(codec))?;
        let outcome = match writer.write_all(PAYLOAD) {
            Ok(()) => writer.finish(),
            Err(err) => Err(err),
        };
        assert!(outcome.is_err(), "{codec} swallowed a failed final write");
    }
    Ok(())
}
