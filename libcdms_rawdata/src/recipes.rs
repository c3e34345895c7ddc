// Remap recipes are plain data: a YAML library of named channel rewrites. Nothing in the
// reader knows about any particular wiring, it only applies the compiled RemapTable.
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::channel_map::{channel_table, n_all_channels};
use super::detector_code::code_base;
use super::detector_config::ChannelParameters;
use super::error::{ChannelMapError, RecipeError};
use super::remap::{RemapTable, DELETED_CODE};

// Detector numbers occupy three decimal digits of a channel code
const MAX_DETECTOR_NUM: u32 = 1000;

/// Load the recipe library bundled with the crate
fn load_default_library() -> String {
    String::from(include_str!("data/remap_recipes.yaml"))
}

/// New channel index for each old channel index; None drops the channel
pub type ChannelList = Vec<Option<u32>>;

/// One named wiring correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub from_type: u32,
    pub to_type: u32,
    /// Target detector number. None keeps the source number
    #[serde(default)]
    pub to_detector: Option<u32>,
    #[serde(default)]
    pub detectors: BTreeMap<u32, ChannelList>,
    /// Fallback list for detectors without an entry in `detectors`
    #[serde(default)]
    pub channels: Option<ChannelList>,
    #[serde(default)]
    pub overrides: BTreeMap<u32, ChannelParameters>,
    #[serde(default)]
    pub swap_sample_pairs: bool,
}

impl Recipe {
    fn channel_list(&self, det_num: u32) -> Option<&ChannelList> {
        self.detectors.get(&det_num).or(self.channels.as_ref())
    }

    fn all_lists(&self) -> impl Iterator<Item = (Option<u32>, &ChannelList)> {
        self.detectors
            .iter()
            .map(|(det, list)| (Some(*det), list))
            .chain(self.channels.iter().map(|list| (None, list)))
    }

    /// Check the lists against the channel tables of both detector types
    fn validate(&self, name: &str) -> Result<(), RecipeError> {
        let n_from = n_all_channels(self.from_type)? as usize;
        let to_table = channel_table(self.to_type)?;
        for (det, list) in self.all_lists() {
            if list.len() != n_from {
                return Err(RecipeError::BadChannelList(
                    name.to_string(),
                    det.unwrap_or(0),
                    list.len(),
                    self.from_type,
                    n_from,
                ));
            }
            for channel in list.iter().flatten() {
                if *channel as usize >= to_table.all.len() {
                    return Err(ChannelMapError::ChannelOutOfRange(self.to_type, *channel).into());
                }
            }
        }
        for channel in self.overrides.keys() {
            let is_target = self
                .all_lists()
                .any(|(_, list)| list.contains(&Some(*channel)));
            if !is_target {
                return Err(RecipeError::OrphanOverride(name.to_string(), *channel));
            }
        }
        Ok(())
    }

    /// Compile the rewrite of a single source detector
    fn compile_detector(&self, name: &str, det_num: u32) -> Result<RemapTable, RecipeError> {
        let target_num = self.to_detector.unwrap_or(det_num);
        if det_num >= MAX_DETECTOR_NUM || target_num >= MAX_DETECTOR_NUM {
            return Err(RecipeError::UnsupportedDetector(name.to_string(), det_num));
        }
        let list = self
            .channel_list(det_num)
            .ok_or_else(|| RecipeError::UnsupportedDetector(name.to_string(), det_num))?;
        let old_base = code_base(self.from_type, det_num);
        let new_base = code_base(self.to_type, target_num);

        let mut table = RemapTable::new();
        for (channel, target) in list.iter().enumerate() {
            let new_code = match target {
                Some(new_channel) => new_base + new_channel,
                None => DELETED_CODE,
            };
            table.codes.insert(old_base + channel as u32, new_code);
        }
        for (channel, params) in self.overrides.iter() {
            if list.contains(&Some(*channel)) {
                table.overrides.insert(new_base + channel, params.clone());
            }
        }
        table.swap_sample_pairs = self.swap_sample_pairs;
        Ok(table)
    }
}

/// Named remap recipes, keyed by recipe name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipeLibrary {
    recipes: BTreeMap<String, Recipe>,
}

impl RecipeLibrary {
    /// Create a new RecipeLibrary
    /// If the path is None, we load the default that is bundled with the crate
    pub fn new(path: Option<&Path>) -> Result<Self, RecipeError> {
        let mut contents = String::new();
        if let Some(p) = path {
            if !p.exists() {
                return Err(RecipeError::BadFilePath(p.to_path_buf()));
            }
            let mut file = File::open(p)?;
            file.read_to_string(&mut contents)?;
        } else {
            contents = load_default_library();
        }
        Self::from_yaml(&contents)
    }

    /// Parse and validate a library from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self, RecipeError> {
        let library: Self = serde_yaml::from_str(contents)?;
        for (name, recipe) in library.recipes.iter() {
            recipe.validate(name)?;
        }
        Ok(library)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(|name| name.as_str())
    }

    pub fn recipe(&self, name: &str) -> Result<&Recipe, RecipeError> {
        self.recipes
            .get(name)
            .ok_or_else(|| RecipeError::UnknownRecipe(name.to_string()))
    }

    /// Compile a recipe over every detector it lists
    pub fn table(&self, name: &str) -> Result<RemapTable, RecipeError> {
        let recipe = self.recipe(name)?;
        if recipe.detectors.is_empty() {
            return Err(RecipeError::NoListedDetectors(name.to_string()));
        }
        let mut table = RemapTable::new();
        for det_num in recipe.detectors.keys() {
            table.merge(recipe.compile_detector(name, *det_num)?);
        }
        Ok(table)
    }

    /// Compile a table from per-detector recipe assignments (detector number to recipe name)
    pub fn table_for(&self, assignments: &BTreeMap<u32, String>) -> Result<RemapTable, RecipeError> {
        let mut table = RemapTable::new();
        for (det_num, name) in assignments.iter() {
            let recipe = self.recipe(name)?;
            table.merge(recipe.compile_detector(name, *det_num)?);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector_code::encode_code;

    #[test]
    fn test_bundled_library() {
        let library = RecipeLibrary::new(None).unwrap();
        assert_eq!(library.len(), 18);
        assert!(library.names().any(|name| name == "UMNExternalTrigger"));
        assert!(matches!(
            library.table("NoSuchRecipe"),
            Err(RecipeError::UnknownRecipe(_))
        ));
    }

    #[test]
    fn test_umn_izip_table() {
        let library = RecipeLibrary::new(None).unwrap();
        let table = library.table("UMNiZIP100mmDCRCrevC").unwrap();
        assert_eq!(table.codes.len(), 18);
        assert!(table.swap_sample_pairs);
        assert_eq!(table.target(encode_code(4, 1, 2)), Some(encode_code(700, 1, 5)));
        assert_eq!(table.target(encode_code(4, 2, 5)), Some(encode_code(700, 1, 4)));
        assert_eq!(table.target(encode_code(4, 3, 0)), Some(DELETED_CODE));
        assert_eq!(table.target(encode_code(4, 4, 0)), None);
    }

    #[test]
    fn test_default_channel_list_with_overrides() {
        let library = RecipeLibrary::new(None).unwrap();
        assert!(matches!(
            library.table("CDMSliteSoudanI"),
            Err(RecipeError::NoListedDetectors(_))
        ));

        let assignments = BTreeMap::from([(5, String::from("CDMSliteSoudanI"))]);
        let table = library.table_for(&assignments).unwrap();
        assert_eq!(table.codes.len(), 12);
        assert_eq!(table.target(encode_code(11, 5, 8)), Some(encode_code(21, 5, 2)));
        assert_eq!(table.target(encode_code(11, 5, 11)), Some(DELETED_CODE));
        assert_eq!(table.overrides.len(), 2);
        assert_eq!(
            table.overrides[&encode_code(21, 5, 1)].get("chargeBias"),
            Some(&69.0)
        );
        assert!(!table.swap_sample_pairs);
    }

    #[test]
    fn test_unsupported_detector() {
        let library = RecipeLibrary::new(None).unwrap();
        let assignments = BTreeMap::from([(2, String::from("UMNExternalTrigger"))]);
        assert!(matches!(
            library.table_for(&assignments),
            Err(RecipeError::UnsupportedDetector(_, 2))
        ));
    }

    #[test]
    fn test_validation() {
        let short_list = "Bad:\n  from_type: 4\n  to_type: 700\n  detectors:\n    1: [0, 1]\n";
        assert!(matches!(
            RecipeLibrary::from_yaml(short_list),
            Err(RecipeError::BadChannelList(_, 1, 2, 4, 6))
        ));

        let out_of_range =
            "Bad:\n  from_type: 4\n  to_type: 92\n  detectors:\n    1: [1, null, null, null, null, null]\n";
        assert!(matches!(
            RecipeLibrary::from_yaml(out_of_range),
            Err(RecipeError::ChannelMap(_))
        ));

        let orphan = "Bad:\n  from_type: 4\n  to_type: 4\n  detectors:\n    1: [0, 1, 2, 3, 4, null]\n  overrides:\n    5: { chargeBias: 1.0 }\n";
        assert!(matches!(
            RecipeLibrary::from_yaml(orphan),
            Err(RecipeError::OrphanOverride(_, 5))
        ));
    }

    #[test]
    fn test_missing_library_file() {
        let path = Path::new("/definitely/not/here/recipes.yaml");
        assert!(matches!(
            RecipeLibrary::new(Some(path)),
            Err(RecipeError::BadFilePath(_))
        ));
    }
}
