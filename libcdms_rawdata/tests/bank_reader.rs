mod common;

use common::*;
use libcdms_rawdata::detector_code::encode_code;
use libcdms_rawdata::reader::{FormatKind, RawDataReader, RecordSelection};
use libcdms_rawdata::stream::RawStream;

fn stale_then_live() -> Vec<u32> {
    rev_d_payload(&[
        rev_d_trigger(1, 11, 2, &[(0, 0, vec![])]),
        rev_d_trigger(6, 11, 2, &[(0, 1, vec![10, 11, 12, 13]), (1, 0, vec![20, 21])]),
    ])
}

#[test]
fn test_stale_trigger_skipped() {
    let stream = RawStream::from_bytes(bank_stream(42, &stale_then_live()));
    let mut reader = RawDataReader::new(stream, None, RecordSelection::all(), 1).unwrap();
    assert_eq!(reader.format_kind(), FormatKind::Bank);
    assert_eq!(reader.series_number(), Some(42));
    assert_eq!(reader.dump_number(), None);

    assert!(reader.read_next_event().unwrap());
    assert_eq!(reader.event_category(), 6);
    assert_eq!(reader.event_type(), 0);
    let event = reader.event();
    assert_eq!(event.admin.series_number(), 42);
    assert_eq!(event.admin.event_number(), 1);
    assert_eq!(event.admin.event_time(), EVENT_TIME + 1);

    let pulses = event.detector_pulses(2).unwrap();
    assert_eq!(pulses.len(), 2);
    assert_eq!(pulses[0].code(), encode_code(11, 2, 1));
    assert_eq!(pulses[0].channel_name(), "QOS1");
    assert_eq!(pulses[0].samples(), &[10, 11, 12, 13]);
    assert_eq!(pulses[1].code(), encode_code(11, 2, 2));
    assert_eq!(pulses[1].sample_dt(), 800);

    assert!(!reader.read_next_event().unwrap());
}

#[test]
fn test_file_name_numbering() {
    let stream = RawStream::from_bytes(bank_stream(42, &stale_then_live()));
    let mut reader = RawDataReader::new(
        stream,
        Some("01120210_1416_F0003.mid"),
        RecordSelection::all(),
        1,
    )
    .unwrap();
    assert_eq!(reader.series_number(), Some(11_202_101_416));
    assert_eq!(reader.dump_number(), Some(3));

    assert!(reader.read_next_event().unwrap());
    assert_eq!(reader.event().admin.series_number(), 11_202_101_416);
    assert_eq!(reader.event().admin.event_number(), 30_000);
}

#[test]
fn test_skip_matches_read_and_discard() {
    let payload = rev_d_payload(&[
        rev_d_trigger(1, 11, 2, &[(0, 0, vec![])]),
        rev_d_trigger(6, 11, 2, &[(0, 1, vec![10, 11])]),
        rev_d_trigger(8, 11, 3, &[(0, 1, vec![30, 31])]),
    ]);
    let bytes = bank_stream(42, &payload);

    let mut reading =
        RawDataReader::new(RawStream::from_bytes(bytes.clone()), None, RecordSelection::all(), 1)
            .unwrap();
    assert!(reading.read_next_event().unwrap());
    assert!(reading.read_next_event().unwrap());

    let mut skipping =
        RawDataReader::new(RawStream::from_bytes(bytes), None, RecordSelection::all(), 1).unwrap();
    assert!(skipping.read_next_event_after(1).unwrap());
    assert_eq!(skipping.event().admin.event_number(), 2);
    assert_eq!(
        skipping.event().admin.event_number(),
        reading.event().admin.event_number()
    );
    assert_eq!(skipping.event_category(), 8);
    assert_eq!(skipping.event().zip_pulses(), reading.event().zip_pulses());
    assert_eq!(skipping.event().detector_pulses(3).unwrap()[0].samples(), &[30, 31]);
    assert!(!skipping.skip_events(1).unwrap());

    skipping.rewind().unwrap();
    assert!(skipping.read_next_event().unwrap());
    assert_eq!(skipping.event().admin.event_number(), 1);
    assert_eq!(skipping.event_category(), 6);
}

#[test]
fn test_all_stale_envelope_yields_empty_event() {
    let payload = rev_d_payload(&[rev_d_trigger(7, 11, 1, &[(0, 0, vec![])])]);
    let stream = RawStream::from_bytes(bank_stream(5, &payload));
    let mut reader = RawDataReader::new(stream, None, RecordSelection::all(), 1).unwrap();
    assert!(reader.read_next_event().unwrap());
    assert_eq!(reader.event_category(), 7);
    assert!(reader.event().zip_pulses().is_empty());
    assert!(!reader.read_next_event().unwrap());
}
