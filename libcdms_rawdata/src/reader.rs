use std::path::Path;
use std::sync::OnceLock;

use bit_set::BitSet;
use regex::Regex;

use super::bank::BankNavigator;
use super::constants::RecordKind;
use super::detector_config::DetectorConfigData;
use super::endian::{WordBuffer, WordOrder};
use super::error::{RawDataReaderError, RemapError};
use super::event::RawEvent;
use super::native::{is_native_file_word, read_header_words, NativeNavigator};
use super::pulse::{PulseClass, PulseRecord};
use super::remap::{remap_detector_config, remap_zip_pulses, RemapTable};
use super::stream::RawStream;

const FILE_NAME_PATTERN: &str = r"([0-9]+)_([0-9]+)_F([0-9]+)";
static FILE_NAME_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
// Bank event numbers of dump N start at N * 10000
const DUMP_EVENT_SCALE: u32 = 10_000;

/// Series and dump numbers carried by a raw file name such as `01120210_1416_F0003.mid`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIds {
    pub series: u64,
    pub dump: u32,
}

impl FileIds {
    /// The series is the first two number groups spliced together. None if the name does
    /// not follow the pattern
    pub fn parse(file_name: &str) -> Option<Self> {
        let pattern = FILE_NAME_REGEX
            .get_or_init(|| Regex::new(FILE_NAME_PATTERN).ok())
            .as_ref()?;
        let captures = pattern.captures(file_name)?;
        let series = format!("{}{}", &captures[1], &captures[2]).parse().ok()?;
        let dump = captures[3].parse().ok()?;
        Some(Self { series, dump })
    }
}

/// Which records the reader decodes, and which pulse classes it files.
///
/// Records of unselected kinds are sought past without being read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSelection {
    kinds: BitSet,
    zip_pulses: bool,
    veto_pulses: bool,
    noise_monitor_pulses: bool,
    other_pulses: bool,
}

impl RecordSelection {
    /// Select nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Select every record the reader can decode
    pub fn all() -> Self {
        Self::new()
            .with_detector_config()
            .with_admin()
            .with_history()
            .with_trigger()
            .with_gps()
            .with_zip_pulses()
            .with_veto_pulses()
            .with_noise_monitor_pulses()
            .with_other_pulses()
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kinds.insert(kind.index());
        self
    }

    pub fn with_detector_config(self) -> Self {
        self.with_kind(RecordKind::DetectorConfig)
    }

    pub fn with_admin(self) -> Self {
        self.with_kind(RecordKind::Admin)
            .with_kind(RecordKind::Admin64)
    }

    pub fn with_history(self) -> Self {
        self.with_kind(RecordKind::SoudanHistory)
    }

    pub fn with_trigger(self) -> Self {
        self.with_kind(RecordKind::Trigger)
    }

    pub fn with_gps(self) -> Self {
        self.with_kind(RecordKind::External)
    }

    fn with_pulses(self) -> Self {
        self.with_kind(RecordKind::Pulse)
            .with_kind(RecordKind::PulseExpandedCode)
    }

    pub fn with_zip_pulses(mut self) -> Self {
        self.zip_pulses = true;
        self.with_pulses()
    }

    pub fn with_veto_pulses(mut self) -> Self {
        self.veto_pulses = true;
        self.with_pulses()
    }

    pub fn with_noise_monitor_pulses(mut self) -> Self {
        self.noise_monitor_pulses = true;
        self.with_pulses()
    }

    pub fn with_other_pulses(mut self) -> Self {
        self.other_pulses = true;
        self.with_pulses()
    }

    pub fn is_selected(&self, kind: RecordKind) -> bool {
        self.kinds.contains(kind.index())
    }

    /// Whether pulses of this class are kept in the event
    pub fn files(&self, class: PulseClass) -> bool {
        match class {
            PulseClass::Phonon | PulseClass::Charge => self.zip_pulses,
            PulseClass::Veto => self.veto_pulses,
            PulseClass::NoiseMonitor => self.noise_monitor_pulses,
            PulseClass::Other => self.other_pulses,
        }
    }

    fn file_pulse(&self, event: &mut RawEvent, pulse: PulseRecord) {
        if self.files(pulse.class()) {
            event.store_pulse(pulse);
        }
    }
}

/// A wire format able to produce events
pub trait EventSource {
    /// Decode the next event into `event`. Returns false at the end of the stream
    fn read_event(
        &mut self,
        stream: &mut RawStream,
        selection: &RecordSelection,
        event: &mut RawEvent,
    ) -> Result<bool, RawDataReaderError>;

    /// Pass over up to `n` events. Returns the number passed
    fn skip_events(&mut self, stream: &mut RawStream, n: usize)
        -> Result<usize, RawDataReaderError>;

    fn current_event_position(&self) -> u64;
    fn next_event_position(&self) -> u64;
    fn event_length(&self) -> u64;
}

fn decode_native_record(
    kind: RecordKind,
    buffer: &WordBuffer,
    selection: &RecordSelection,
    event: &mut RawEvent,
) -> Result<(), RawDataReaderError> {
    match kind {
        RecordKind::Admin | RecordKind::Admin64 => event.admin.decode(buffer, kind)?,
        RecordKind::SoudanHistory => event.history.decode(buffer)?,
        RecordKind::Trigger => event.trigger.decode(buffer)?,
        RecordKind::External => event.gps.decode(buffer)?,
        RecordKind::Pulse | RecordKind::PulseExpandedCode => {
            selection.file_pulse(event, PulseRecord::from_buffer(buffer, kind)?)
        }
        _ => spdlog::debug!("No decoder for {} record, skipping", kind.name()),
    }
    Ok(())
}

impl EventSource for NativeNavigator {
    fn read_event(
        &mut self,
        stream: &mut RawStream,
        selection: &RecordSelection,
        event: &mut RawEvent,
    ) -> Result<bool, RawDataReaderError> {
        let header = match self.read_event_header(stream)? {
            Some(header) => header,
            None => return Ok(false),
        };
        event.set_header(header.category, header.event_type);

        while self.has_next_record() {
            let record = self.read_record_header(stream)?;
            let kind = match record.kind() {
                Some(kind) if selection.is_selected(kind) => kind,
                Some(kind) => {
                    spdlog::debug!("Skipping unselected {} record", kind.name());
                    continue;
                }
                None => {
                    spdlog::debug!(
                        "Skipping unknown record {:#x} of {} bytes",
                        record.id,
                        record.length
                    );
                    continue;
                }
            };
            spdlog::debug!("Decoding {} record of {} bytes", kind.name(), record.length);
            let buffer = self.read_record_body(stream, &record)?;
            decode_native_record(kind, &buffer, selection, event)?;
        }
        Ok(true)
    }

    fn skip_events(
        &mut self,
        stream: &mut RawStream,
        n: usize,
    ) -> Result<usize, RawDataReaderError> {
        for skipped in 0..n {
            if self.read_event_header(stream)?.is_none() {
                return Ok(skipped);
            }
        }
        Ok(n)
    }

    fn current_event_position(&self) -> u64 {
        NativeNavigator::current_event_position(self)
    }

    fn next_event_position(&self) -> u64 {
        NativeNavigator::next_event_position(self)
    }

    fn event_length(&self) -> u64 {
        NativeNavigator::event_length(self)
    }
}

/// Bank navigation plus the synthesized admin numbering
#[derive(Debug, Clone)]
pub struct BankState {
    navigator: BankNavigator,
    series_number: u64,
    event_counter: u32,
}

impl BankState {
    fn new(navigator: BankNavigator, file_ids: Option<FileIds>) -> Self {
        let (series_number, event_counter) = match file_ids {
            Some(ids) => (
                ids.series,
                ids.dump.wrapping_mul(DUMP_EVENT_SCALE).wrapping_sub(1),
            ),
            None => (navigator.run_serial() as u64, 0),
        };
        Self {
            navigator,
            series_number,
            event_counter,
        }
    }

    pub fn series_number(&self) -> u64 {
        self.series_number
    }

    /// Number given to the most recent event
    pub fn event_counter(&self) -> u32 {
        self.event_counter
    }
}

impl EventSource for BankState {
    fn read_event(
        &mut self,
        stream: &mut RawStream,
        selection: &RecordSelection,
        event: &mut RawEvent,
    ) -> Result<bool, RawDataReaderError> {
        let trigger = match self.navigator.next_trigger(stream)? {
            Some(trigger) => trigger,
            None => return Ok(false),
        };
        event.set_header(trigger.category, 0);
        for pulse in trigger.pulses {
            selection.file_pulse(event, pulse);
        }

        self.event_counter = self.event_counter.wrapping_add(1);
        if selection.is_selected(RecordKind::Admin) {
            event
                .admin
                .set_record(self.series_number, self.event_counter, 0, 0, trigger.timestamp)?;
        }
        Ok(true)
    }

    fn skip_events(
        &mut self,
        stream: &mut RawStream,
        n: usize,
    ) -> Result<usize, RawDataReaderError> {
        let skipped = self.navigator.skip_events(stream, n)?;
        self.event_counter = self.event_counter.wrapping_add(skipped as u32);
        Ok(skipped)
    }

    fn current_event_position(&self) -> u64 {
        self.navigator.current_event_position()
    }

    fn next_event_position(&self) -> u64 {
        self.navigator.next_event_position()
    }

    fn event_length(&self) -> u64 {
        self.navigator.event_length()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Native,
    Bank,
}

/// The wire format of the open stream, decided once when the file header is read
#[derive(Debug, Clone)]
pub enum Format {
    Native(NativeNavigator),
    Bank(BankState),
}

impl Format {
    pub fn kind(&self) -> FormatKind {
        match self {
            Self::Native(_) => FormatKind::Native,
            Self::Bank(_) => FormatKind::Bank,
        }
    }

    fn source(&mut self) -> &mut dyn EventSource {
        match self {
            Self::Native(nav) => nav,
            Self::Bank(state) => state,
        }
    }

    fn source_ref(&self) -> &dyn EventSource {
        match self {
            Self::Native(nav) => nav,
            Self::Bank(state) => state,
        }
    }
}

/// RawDataReader walks a raw data stream one event at a time.
///
/// The file header is read when the reader is built, which also decides the wire format.
/// Every call to `read_next_event` resets the event and fills it with the selected records.
#[derive(Debug)]
pub struct RawDataReader {
    stream: RawStream,
    format: Format,
    selection: RecordSelection,
    event: RawEvent,
    detector_config: DetectorConfigData,
    file_ids: Option<FileIds>,
}

impl RawDataReader {
    /// Open a raw data file (optionally gzipped) and read its header
    pub fn open(
        path: &Path,
        selection: RecordSelection,
        n_towers: usize,
    ) -> Result<Self, RawDataReaderError> {
        let stream = RawStream::open(path)?;
        let file_name = path.file_name().and_then(|name| name.to_str());
        Self::new(stream, file_name, selection, n_towers)
    }

    /// Build a reader over an already opened stream. The file name, if any, is only used
    /// for its series and dump numbers
    pub fn new(
        mut stream: RawStream,
        file_name: Option<&str>,
        selection: RecordSelection,
        n_towers: usize,
    ) -> Result<Self, RawDataReaderError> {
        let file_ids = file_name.and_then(FileIds::parse);
        let mut detector_config = DetectorConfigData::new();
        let format = Self::read_file_header(&mut stream, &selection, &mut detector_config, file_ids)?;
        spdlog::info!(
            "Reading {:?} format raw data from {}",
            format.kind(),
            stream
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| String::from("memory"))
        );
        Ok(Self {
            stream,
            format,
            selection,
            event: RawEvent::new(n_towers),
            detector_config,
            file_ids,
        })
    }

    fn read_file_header(
        stream: &mut RawStream,
        selection: &RecordSelection,
        detector_config: &mut DetectorConfigData,
        file_ids: Option<FileIds>,
    ) -> Result<Format, RawDataReaderError> {
        let header = read_header_words(stream, "file")?
            .ok_or(RawDataReaderError::TruncatedHeader("file"))?;
        if is_native_file_word(header[0]) {
            let config = if selection.is_selected(RecordKind::DetectorConfig) {
                Some(detector_config)
            } else {
                None
            };
            let navigator = NativeNavigator::read_file_header(stream, header, config)?;
            return Ok(Format::Native(navigator));
        }

        stream.rewind();
        match BankNavigator::open(stream)? {
            Some(navigator) => Ok(Format::Bank(BankState::new(navigator, file_ids))),
            None => Err(RawDataReaderError::UnrecognizedFileHeader(
                header[0], header[1],
            )),
        }
    }

    /// Decode the next event. Returns false once the stream is exhausted.
    ///
    /// After an error the position is undefined; rewind or reopen before reading again.
    pub fn read_next_event(&mut self) -> Result<bool, RawDataReaderError> {
        self.event.clear();
        self.format
            .source()
            .read_event(&mut self.stream, &self.selection, &mut self.event)
    }

    /// Pass over `n` events without decoding them. Returns false if the stream ended first
    pub fn skip_events(&mut self, n: usize) -> Result<bool, RawDataReaderError> {
        self.event.clear();
        let skipped = self.format.source().skip_events(&mut self.stream, n)?;
        Ok(skipped == n)
    }

    /// Skip `n` events, then decode the one after them
    pub fn read_next_event_after(&mut self, n: usize) -> Result<bool, RawDataReaderError> {
        if !self.skip_events(n)? {
            return Ok(false);
        }
        self.read_next_event()
    }

    /// Go back to the start of the stream and read the file header again
    pub fn rewind(&mut self) -> Result<(), RawDataReaderError> {
        self.stream.rewind();
        self.event.clear();
        self.detector_config.reset();
        self.format = Self::read_file_header(
            &mut self.stream,
            &self.selection,
            &mut self.detector_config,
            self.file_ids,
        )?;
        Ok(())
    }

    /// Reset the current event
    pub fn clear(&mut self) {
        self.event.clear();
    }

    /// Apply a channel rewrite to the configuration (once per file) and to the pulses of
    /// the current event (once per event)
    pub fn remap(&mut self, table: &RemapTable) -> Result<(), RemapError> {
        if self.detector_config.is_filled() && !self.detector_config.is_modified() {
            remap_detector_config(&mut self.detector_config, table)?;
        }
        if !self.event.is_zip_pulses_remapped() {
            let is_native = self.format_kind() == FormatKind::Native;
            remap_zip_pulses(self.event.zip_pulses_mut(), table, is_native)?;
            self.event.mark_zip_pulses_remapped();
        }
        Ok(())
    }

    pub fn event(&self) -> &RawEvent {
        &self.event
    }

    pub fn selection(&self) -> &RecordSelection {
        &self.selection
    }

    /// Byte order of the native stream. The bank format is always little-endian
    pub fn word_order(&self) -> WordOrder {
        match &self.format {
            Format::Native(nav) => nav.word_order(),
            Format::Bank(_) => WordOrder::Unswapped,
        }
    }

    pub fn format_kind(&self) -> FormatKind {
        self.format.kind()
    }

    pub fn detector_config(&self) -> &DetectorConfigData {
        &self.detector_config
    }

    /// Series number from the file name, or from the begin-of-run envelope of a bank file
    pub fn series_number(&self) -> Option<u64> {
        match &self.format {
            Format::Bank(state) => Some(state.series_number()),
            Format::Native(_) => self.file_ids.map(|ids| ids.series),
        }
    }

    /// Dump number from the file name
    pub fn dump_number(&self) -> Option<u32> {
        self.file_ids.map(|ids| ids.dump)
    }

    pub fn current_event_position(&self) -> u64 {
        self.format.source_ref().current_event_position()
    }

    pub fn next_event_position(&self) -> u64 {
        self.format.source_ref().next_event_position()
    }

    pub fn event_length(&self) -> u64 {
        self.format.source_ref().event_length()
    }

    /// Start of the last record body. Bank envelopes count as a single record
    pub fn current_record_position(&self) -> u64 {
        match &self.format {
            Format::Native(nav) => nav.current_record_position(),
            Format::Bank(state) => state.current_event_position(),
        }
    }

    pub fn next_record_header_position(&self) -> u64 {
        match &self.format {
            Format::Native(nav) => nav.next_record_header_position(),
            Format::Bank(state) => state.next_event_position(),
        }
    }

    pub fn event_category(&self) -> u32 {
        self.event.category()
    }

    pub fn event_type(&self) -> u32 {
        self.event.event_type()
    }
}
