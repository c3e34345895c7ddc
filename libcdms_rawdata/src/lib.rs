//! # libcdms_rawdata
//!
//! libcdms_rawdata decodes CDMS raw detector data, written in Rust. It reads the native
//! streaming format written by the DAQ and the self-describing bank (MIDAS style) format
//! used by test facilities, and presents both as the same sequence of decoded events:
//! administrative record, trigger and trigger history, GPS time, detector configuration,
//! and the digitized pulses of every channel grouped per detector.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use libcdms_rawdata::reader::{RawDataReader, RecordSelection};
//!
//! let mut reader = RawDataReader::open(
//!     Path::new("/data/01120210_1416_F0003.mid"),
//!     RecordSelection::all(),
//!     5,
//! )?;
//! while reader.read_next_event()? {
//!     let event = reader.event();
//!     for (det_num, pulses) in event.zip_pulses() {
//!         println!("detector {det_num}: {} pulses", pulses.len());
//!     }
//! }
//! # Ok::<(), libcdms_rawdata::error::RawDataReaderError>(())
//! ```
//!
//! `read_next_event` returns `Ok(false)` at the end of the stream. Any error is fatal for
//! the stream; rewind or reopen to continue.
//!
//! ## Raw Files
//!
//! Raw files may be gzipped. Opening `run.bin` will first look for `run.bin.gz`. The
//! whole file is inflated into memory so that the navigator can seek to absolute offsets.
//!
//! The format is decided from the first words of the file:
//!
//! - `0x01020304` / `0x04030201`: native format, written unswapped / byte swapped
//! - `0x00000000`: legacy native format, byte order is resolved at the first event
//! - a begin-of-run bank envelope (`0x8000`): bank format
//!
//! Lengths in native event and record headers are byte counts. Bank file names following
//! `<series>_<time>_F<dump>` give the series number and the first event number
//! (`dump * 10000`).
//!
//! ## Configuration
//!
//! A reader can be described by a YAML file, loaded with
//! [`config::ReaderConfig::read_config_file`]:
//!
//! ```yml
//! raw_data_path: /data/01120210_1416_F0003.mid
//! read_detector_config: true
//! read_admin: true
//! read_history: true
//! read_trigger: true
//! read_gps: true
//! read_zip_pulses: true
//! read_veto_pulses: true
//! read_noise_monitor_pulses: true
//! n_towers: 5
//! recipe_library_path: null
//! remap_recipe: UMNiZIP100mmDCRCrevC
//! remap_assignments: {}
//! ```
//!
//! Note that if the `recipe_library_path` field is set to `null`, the bundled recipe
//! library will be used.
//!
//! ## Channel Remapping
//!
//! Detectors read out with non-canonical wiring can be corrected after decoding. A recipe
//! names, for each source detector, the new channel of every old channel (or `null` to
//! drop it), the target detector type and number, and parameter overrides for the
//! detector configuration:
//!
//! ```yml
//! UMNExternalTrigger:
//!   from_type: 4
//!   to_type: 92
//!   to_detector: null
//!   detectors:
//!     4: [null, null, 0, null, null, null]
//! ```
//!
//! Recipes are compiled into a [`remap::RemapTable`] and applied with
//! [`reader::RawDataReader::remap`]. The configuration is rewritten once per file, the
//! pulses once per event.
//!
//! ## Logging
//!
//! The library logs through `spdlog`. Install a sink in the application to see the open,
//! begin-of-run and remap messages; per-record dispatch is logged at debug level.
pub mod admin;
pub mod bank;
pub mod channel_map;
pub mod config;
pub mod constants;
pub mod detector_code;
pub mod detector_config;
pub mod endian;
pub mod error;
pub mod event;
pub mod gps;
pub mod history;
pub mod native;
pub mod pulse;
pub mod reader;
pub mod recipes;
pub mod remap;
pub mod stream;
pub mod trigger;
