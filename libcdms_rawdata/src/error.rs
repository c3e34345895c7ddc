use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelMapError {
    #[error("No channel table exists for detector type {0}")]
    UnknownDetectorType(u32),
    #[error("Channel {1} is not defined for detector type {0}")]
    ChannelOutOfRange(u32, u32),
    #[error("Channel name {1} is not defined for detector type {0}")]
    UnknownChannelName(u32, String),
    #[error("Channel name {0} is neither a phonon nor a charge channel")]
    UnknownChannelKind(String),
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Record decoder failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Record length {0} is not a whole number of words")]
    MisalignedLength(u64),
    #[error("{0} record is too short -- needed word {1} but only {2} words are present")]
    ShortRecord(&'static str, usize, usize),
    #[error("{0} decoder was handed a record of unexpected kind {1:#x}")]
    UnexpectedKind(&'static str, u32),
    #[error("Detector configuration sub-record {0:#x} declared {1} words; expected {2}")]
    BadSubRecordSize(u32, u32, u32),
    #[error("Veto history entry has {0} mask words; expected 2")]
    BadVetoMaskWidth(usize),
    #[error("{0} record was already set for this event")]
    AlreadySet(&'static str),
    #[error("{0} was requested before the event was read")]
    NotRead(&'static str),
    #[error("Tower {0} was requested but the record only holds {1} towers")]
    TowerOutOfRange(usize, usize),
    #[error("Requested named field {0} does not exist")]
    UnknownField(String),
    #[error("Pulse channel code {0} names {1} which does not fit the composite code scheme")]
    UnencodableCode(u32, String),
    #[error("Record decoder failed due to channel map error: {0}")]
    ChannelMap(#[from] ChannelMapError),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Could not open raw data stream because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Raw data stream failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BankError {
    #[error("Bank envelope failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Bank envelope declared an invalid data size of {0} bytes")]
    BadDataSize(u32),
    #[error("Bank payload word {1} is missing the {0} marker bits: {2:#010x}")]
    BadMarker(&'static str, usize, u32),
    #[error("Bank payload ended early -- needed word {0} of {1}")]
    Truncated(usize, usize),
    #[error("Bank payload channel at word {0} declares more samples than fit in a word count")]
    SampleCountOverflow(usize),
    #[error("Bank payload has unrecognized revision marker {0:#010x}")]
    UnknownRevision(u32),
    #[error("Bank payload names detector type {0} number {1} channel {2} which has no channel code")]
    BadChannelCode(u32, u32, u32),
    #[error("Bank adapter failed due to record error: {0}")]
    Record(#[from] RecordError),
}

#[derive(Debug, Error)]
pub enum RawDataReaderError {
    #[error("RawDataReader failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("RawDataReader failed due to stream error: {0}")]
    Stream(#[from] StreamError),
    #[error("RawDataReader failed due to record error: {0}")]
    Record(#[from] RecordError),
    #[error("RawDataReader failed due to bank error: {0}")]
    Bank(#[from] BankError),
    #[error("Unrecognized file header -- {0:#010x} {1:#010x}")]
    UnrecognizedFileHeader(u32, u32),
    #[error("Unrecognized event header word {0:#010x}")]
    BadEventSentinel(u32),
    #[error("Event header declared a length of {0} bytes which is not a whole number of words")]
    BadEventLength(u64),
    #[error("Record ending at {0} crosses the event boundary at {1}")]
    RecordCrossesEvent(u64, u64),
    #[error("Stream ended inside a {0} header")]
    TruncatedHeader(&'static str),
}

#[derive(Debug, Error)]
pub enum RemapError {
    #[error("Detector configuration was already remapped")]
    AlreadyModified,
    #[error("Remap failed due to record error: {0}")]
    Record(#[from] RecordError),
}

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("Recipe library failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Recipe library failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Could not load recipe library as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Recipe library has no recipe named {0}")]
    UnknownRecipe(String),
    #[error("Recipe {0} lists {2} channels for detector {1}; detector type {3} has {4}")]
    BadChannelList(String, u32, usize, u32, usize),
    #[error("Recipe {0} override refers to channel {1} which no channel maps to")]
    OrphanOverride(String, u32),
    #[error("Recipe {0} does not support detector {1}")]
    UnsupportedDetector(String, u32),
    #[error("Recipe {0} lists no detectors; assign it to detectors explicitly")]
    NoListedDetectors(String),
    #[error("Recipe library failed due to channel map error: {0}")]
    ChannelMap(#[from] ChannelMapError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}
