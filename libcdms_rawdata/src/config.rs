use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::{ConfigError, RawDataReaderError, RecipeError};
use super::reader::{RawDataReader, RecordSelection};
use super::recipes::RecipeLibrary;
use super::remap::RemapTable;

/// Structure representing the reader configuration. Contains the raw file path, which
/// records to decode, and which channel remap to apply.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    pub raw_data_path: PathBuf,
    pub read_detector_config: bool,
    pub read_admin: bool,
    pub read_history: bool,
    pub read_trigger: bool,
    pub read_gps: bool,
    pub read_zip_pulses: bool,
    pub read_veto_pulses: bool,
    pub read_noise_monitor_pulses: bool,
    pub n_towers: usize,
    pub recipe_library_path: Option<PathBuf>,
    /// Recipe applied to every detector it lists
    pub remap_recipe: Option<String>,
    /// Recipe per detector number, for recipes that apply to any detector
    #[serde(default)]
    pub remap_assignments: BTreeMap<u32, String>,
}

impl Default for ReaderConfig {
    /// Generate a new ReaderConfig which decodes everything. The path is empty/invalid
    fn default() -> Self {
        Self {
            raw_data_path: PathBuf::from("None"),
            read_detector_config: true,
            read_admin: true,
            read_history: true,
            read_trigger: true,
            read_gps: true,
            read_zip_pulses: true,
            read_veto_pulses: true,
            read_noise_monitor_pulses: true,
            n_towers: 5,
            recipe_library_path: None,
            remap_recipe: None,
            remap_assignments: BTreeMap::new(),
        }
    }
}

impl ReaderConfig {
    /// Read the configuration in a YAML file
    /// Returns a ReaderConfig if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Build the record selection described by the read flags
    pub fn record_selection(&self) -> RecordSelection {
        let mut selection = RecordSelection::new();
        if self.read_detector_config {
            selection = selection.with_detector_config();
        }
        if self.read_admin {
            selection = selection.with_admin();
        }
        if self.read_history {
            selection = selection.with_history();
        }
        if self.read_trigger {
            selection = selection.with_trigger();
        }
        if self.read_gps {
            selection = selection.with_gps();
        }
        if self.read_zip_pulses {
            selection = selection.with_zip_pulses();
        }
        if self.read_veto_pulses {
            selection = selection.with_veto_pulses();
        }
        if self.read_noise_monitor_pulses {
            selection = selection.with_noise_monitor_pulses();
        }
        selection
    }

    pub fn needs_remap(&self) -> bool {
        self.remap_recipe.is_some() || !self.remap_assignments.is_empty()
    }

    /// Load the recipe library, falling back to the bundled one
    pub fn recipe_library(&self) -> Result<RecipeLibrary, RecipeError> {
        RecipeLibrary::new(self.recipe_library_path.as_deref())
    }

    /// Compile the requested remap. None if no remap was requested
    pub fn remap_table(&self) -> Result<Option<RemapTable>, RecipeError> {
        if !self.needs_remap() {
            return Ok(None);
        }
        let library = self.recipe_library()?;
        let mut table = match &self.remap_recipe {
            Some(name) => library.table(name)?,
            None => RemapTable::new(),
        };
        if !self.remap_assignments.is_empty() {
            table.merge(library.table_for(&self.remap_assignments)?);
        }
        Ok(Some(table))
    }

    /// Open the configured raw data file
    pub fn open_reader(&self) -> Result<RawDataReader, RawDataReaderError> {
        RawDataReader::open(&self.raw_data_path, self.record_selection(), self.n_towers)
    }
}
