//! Logging setup and serialization/IO helpers shared by both binaries.

use bincode::{deserialize_from, serialize_into};
use chrono;
use env_logger::LogBuilder;
use flate2::read::GzDecoder;
use log::{LogLevelFilter, LogRecord};
use serde::Serialize;
use std::env;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::*;

/// Initialize the global logger, writing to standard error.
pub fn init_logging(level: LogLevelFilter) {
    let format = |record: &LogRecord| {
        let t = chrono::Local::now();
        format!("{} [{}] {}",
                t.format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args())
    };

    let mut builder = LogBuilder::new();
    builder.format(format).filter(None, level);

    if let Ok(spec) = env::var("RUST_LOG") {
        builder.parse(&spec);
    }

    builder.init().expect("Unable to initialize logger!");
}

/// Open a file for reading, decompressing on the fly if it starts with the
/// gzip magic bytes.
pub fn open_maybe_gz(path: &str) -> LocustResult<Box<dyn Read + Send>> {
    let mut file = File::open(Path::new(path))
        .map_err(|_| LocustError::MissingFile(path.to_string()))?;
    let mut magic = [0u8; 2];
    let read_len = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    if read_len == 2 && magic == [0x1f, 0x8b] {
        Ok(Box::new(GzDecoder::new(file)?))
    } else {
        Ok(Box::new(file))
    }
}

/// Parse an arbitrary deserializable type from a file path.
pub fn from_file<T>(p: &str) -> LocustResult<T>
    where T: serde::de::DeserializeOwned
{
    let f = File::open(Path::new(p))?;
    let mut reader = BufReader::new(f);
    Ok(deserialize_from(&mut reader)?)
}

/// Write an arbitrary serializable type to a file path.
pub fn write_to_file<T>(t: &T, p: &str) -> LocustResult<()>
    where T: Serialize
{
    let f = File::create(Path::new(p))?;
    let mut writer = BufWriter::new(f);
    Ok(serialize_into(&mut writer, t)?)
}

#[cfg(test)]
mod test {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::collections::BTreeMap;
    use std::io::{Read, Write};
    use tempfile::NamedTempFile;
    use super::*;

    #[test]
    fn open_maybe_gz_reads_plain_and_gz() {
        let content = b">r1\nACGT\n";

        let mut plain = NamedTempFile::new().unwrap();
        plain.write_all(content).unwrap();
        let plain_path = plain.path().to_str().unwrap();

        let mut plain_reader = open_maybe_gz(plain_path).unwrap();
        let mut plain_buf = Vec::new();
        plain_reader.read_to_end(&mut plain_buf).unwrap();
        assert_eq!(content.as_ref(), plain_buf.as_slice());

        let mut gz = NamedTempFile::new().unwrap();
        {
            let mut encoder = GzEncoder::new(gz.as_file_mut(), Compression::Default);
            encoder.write_all(content).unwrap();
            encoder.finish().unwrap();
        }
        let gz_path = gz.path().to_str().unwrap();

        let mut gz_reader = open_maybe_gz(gz_path).unwrap();
        let mut gz_buf = Vec::new();
        gz_reader.read_to_end(&mut gz_buf).unwrap();
        assert_eq!(content.as_ref(), gz_buf.as_slice());
    }

    #[test]
    fn missing_file_is_reported_as_missing() {
        match open_maybe_gz("/definitely/not/a/real/path.fa") {
            Err(LocustError::MissingFile(_)) => (),
            other => panic!("expected MissingFile, got {:?}", other.map(|_| ())),
        }
    }

    quickcheck! {
        fn file_roundtrip(map: BTreeMap<String, String>) -> bool {
            let outfile = NamedTempFile::new().unwrap();
            let outfile = outfile.path().to_path_buf();
            let outfile = outfile.to_str().unwrap();

            write_to_file(&map, outfile).unwrap();
            let from_file: BTreeMap<String, String> = from_file(outfile).unwrap();

            map == from_file
        }
    }
}
