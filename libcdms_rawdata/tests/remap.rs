mod common;

use common::*;
use libcdms_rawdata::detector_code::encode_code;
use libcdms_rawdata::error::RemapError;
use libcdms_rawdata::reader::{RawDataReader, RecordSelection};
use libcdms_rawdata::recipes::RecipeLibrary;
use libcdms_rawdata::remap::remap_detector_config;
use libcdms_rawdata::stream::RawStream;

/// Three DCRCs read out as type 4 detectors 1..3, every channel present
fn umn_stream() -> NativeBuilder {
    let mut records = vec![admin_record(1)];
    for det_num in 1..=3 {
        for channel in 0..6 {
            records.push(pulse_record(
                encode_code(4, det_num, channel),
                &[channel as u16, 100 + channel as u16],
            ));
        }
    }
    NativeBuilder::new()
        .config(&[
            charge_config(encode_code(4, 1, 2)),
            charge_config(encode_code(4, 3, 0)),
        ])
        .event(1, 0, &records)
}

#[test]
fn test_detectors_merged_sorted_and_swapped() {
    let table = RecipeLibrary::new(None)
        .unwrap()
        .table("UMNiZIP100mmDCRCrevC")
        .unwrap();
    let stream = RawStream::from_bytes(umn_stream().bytes(false));
    let mut reader = RawDataReader::new(stream, None, RecordSelection::all(), 1).unwrap();
    assert!(reader.read_next_event().unwrap());
    assert_eq!(reader.event().zip_pulses().len(), 3);

    reader.remap(&table).unwrap();
    let event = reader.event();
    assert!(event.is_zip_pulses_remapped());
    assert_eq!(event.zip_pulses().len(), 1);
    let codes: Vec<u32> = event
        .detector_pulses(1)
        .unwrap()
        .iter()
        .map(|pulse| pulse.code())
        .collect();
    let expected: Vec<u32> = (0..16).map(|channel| encode_code(700, 1, channel)).collect();
    assert_eq!(codes, expected);

    // Detector 1 channel 2 (PA) became PBS1, samples swapped on the native stream
    let pulse = &event.detector_pulses(1).unwrap()[5];
    assert_eq!(pulse.channel_name(), "PBS1");
    assert_eq!(pulse.samples(), &[102, 2]);

    let config = reader.detector_config();
    assert!(config.is_modified());
    assert_eq!(config.len(), 1);
    assert!(config.channel(encode_code(700, 1, 5)).is_some());

    // A second remap of the same event and file changes nothing
    let before = reader.event().zip_pulses().clone();
    reader.remap(&table).unwrap();
    assert_eq!(reader.event().zip_pulses(), &before);
}

#[test]
fn test_next_event_is_remapped_again() {
    let table = RecipeLibrary::new(None)
        .unwrap()
        .table("UMNExternalTrigger")
        .unwrap();
    let mut builder = NativeBuilder::new();
    for event in 1..=2 {
        builder = builder.event(
            0,
            0,
            &[
                admin_record(event),
                pulse_record(encode_code(4, 4, 2), &[1, 2]),
                pulse_record(encode_code(4, 4, 3), &[1, 2]),
            ],
        );
    }
    let stream = RawStream::from_bytes(builder.bytes(false));
    let mut reader = RawDataReader::new(stream, None, RecordSelection::all(), 1).unwrap();

    for _ in 0..2 {
        assert!(reader.read_next_event().unwrap());
        assert!(!reader.event().is_zip_pulses_remapped());
        reader.remap(&table).unwrap();
        let pulses = reader.event().detector_pulses(4).unwrap();
        assert_eq!(pulses.len(), 1);
        assert_eq!(pulses[0].code(), encode_code(92, 4, 0));
        assert_eq!(pulses[0].channel_name(), "P");
    }
}

#[test]
fn test_config_pass_rejects_second_application() {
    let table = RecipeLibrary::new(None)
        .unwrap()
        .table("UMNiZIP100mmDCRCrevC")
        .unwrap();
    let stream = RawStream::from_bytes(umn_stream().bytes(false));
    let mut reader = RawDataReader::new(stream, None, RecordSelection::all(), 1).unwrap();
    reader.remap(&table).unwrap();

    let mut config = reader.detector_config().clone();
    assert!(matches!(
        remap_detector_config(&mut config, &table),
        Err(RemapError::AlreadyModified)
    ));
}
