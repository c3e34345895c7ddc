use flate2::read::MultiGzDecoder;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::error::StreamError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The byte source of a raw data file.
///
/// Raw files are usually gzipped on disk. The whole file is inflated once on open so that
/// the navigator can seek freely to absolute byte offsets.
#[derive(Debug)]
pub struct RawStream {
    cursor: Cursor<Vec<u8>>,
    path: Option<PathBuf>,
}

impl RawStream {
    /// Open a raw data file. `path.gz` is tried before `path`.
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        let mut gz_name = path.as_os_str().to_os_string();
        gz_name.push(".gz");
        let gz_path = PathBuf::from(gz_name);

        let actual_path = if gz_path.exists() {
            gz_path
        } else if path.exists() {
            path.to_path_buf()
        } else {
            return Err(StreamError::BadFilePath(path.to_path_buf()));
        };

        let raw = std::fs::read(&actual_path)?;
        let compressed_size = raw.len();
        let bytes = if raw.starts_with(&GZIP_MAGIC) {
            let mut decoder = MultiGzDecoder::new(raw.as_slice());
            let mut inflated = Vec::new();
            decoder.read_to_end(&mut inflated)?;
            inflated
        } else {
            raw
        };

        spdlog::info!(
            "Opened raw data file {} -- {} on disk, {} decoded",
            actual_path.display(),
            human_bytes::human_bytes(compressed_size as f64),
            human_bytes::human_bytes(bytes.len() as f64)
        );

        Ok(Self {
            cursor: Cursor::new(bytes),
            path: Some(actual_path),
        })
    }

    /// Create a stream over bytes already in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(bytes),
            path: None,
        }
    }

    /// Path of the file actually opened, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn size_bytes(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    pub fn tell(&self) -> u64 {
        self.cursor.position()
    }

    pub fn seek_to(&mut self, position: u64) {
        self.cursor.set_position(position);
    }

    pub fn rewind(&mut self) {
        self.cursor.set_position(0);
    }

    /// Number of bytes between the current position and the end of the stream
    pub fn remaining(&self) -> u64 {
        self.size_bytes().saturating_sub(self.tell())
    }
}

impl Read for RawStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for RawStream {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_open_gzipped_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("run_F0001");
        let gz = dir.path().join("run_F0001.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[1, 2, 3, 4, 5]).unwrap();
        std::fs::write(&gz, encoder.finish().unwrap()).unwrap();

        let mut stream = match RawStream::open(&plain) {
            Ok(s) => s,
            Err(_) => panic!(),
        };
        assert_eq!(stream.size_bytes(), 5);
        assert_eq!(stream.path(), Some(gz.as_path()));
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2]);
        assert_eq!(stream.tell(), 2);
        assert_eq!(stream.remaining(), 3);
        stream.rewind();
        assert_eq!(stream.tell(), 0);
    }

    #[test]
    fn test_open_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.bin");
        std::fs::write(&plain, [9u8; 12]).unwrap();
        let stream = RawStream::open(&plain).unwrap();
        assert_eq!(stream.size_bytes(), 12);
    }

    #[test]
    fn test_missing_file() {
        let result = RawStream::open(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(StreamError::BadFilePath(_))));
    }
}
