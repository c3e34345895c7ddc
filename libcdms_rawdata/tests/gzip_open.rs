mod common;

use std::io::Write;

use common::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use libcdms_rawdata::config::ReaderConfig;
use libcdms_rawdata::detector_code::encode_code;
use libcdms_rawdata::error::{RawDataReaderError, StreamError};
use libcdms_rawdata::reader::{RawDataReader, RecordSelection};

fn stream_bytes() -> Vec<u8> {
    NativeBuilder::new()
        .event(
            0,
            0,
            &[admin_record(3), pulse_record(encode_code(4, 1, 1), &[4, 5])],
        )
        .bytes(false)
}

#[test]
fn test_open_prefers_gzipped_file() {
    let dir = tempfile::tempdir().unwrap();
    let plain_path = dir.path().join("01120210_1416_F0007.bin");
    let gz_path = dir.path().join("01120210_1416_F0007.bin.gz");

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&stream_bytes()).unwrap();
    std::fs::write(&gz_path, encoder.finish().unwrap()).unwrap();

    let mut reader = RawDataReader::open(&plain_path, RecordSelection::all(), 1).unwrap();
    assert_eq!(reader.series_number(), Some(11_202_101_416));
    assert_eq!(reader.dump_number(), Some(7));
    assert!(reader.read_next_event().unwrap());
    assert_eq!(reader.event().admin.event_number(), 3);
    assert_eq!(reader.event().n_zip_pulses(), 1);
    assert!(!reader.read_next_event().unwrap());
}

#[test]
fn test_open_plain_file_through_config() {
    let dir = tempfile::tempdir().unwrap();
    let raw_path = dir.path().join("run.bin");
    std::fs::write(&raw_path, stream_bytes()).unwrap();

    let config = ReaderConfig {
        raw_data_path: raw_path,
        read_zip_pulses: false,
        ..Default::default()
    };
    let mut reader = config.open_reader().unwrap();
    assert_eq!(reader.series_number(), None);
    assert!(reader.read_next_event().unwrap());
    assert_eq!(reader.event().admin.event_number(), 3);
    assert!(reader.event().zip_pulses().is_empty());
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = RawDataReader::open(&dir.path().join("absent.bin"), RecordSelection::all(), 1);
    assert!(matches!(
        result,
        Err(RawDataReaderError::Stream(StreamError::BadFilePath(_)))
    ));
}
