//! YAML preset loader for glossaries and prompt instructions.

use std::path::PathBuf;

use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{GlossaryProvider, PromptPreset};

/// Loads a [`PromptPreset`] from a YAML file:
///
/// ```yaml
/// instructions: Translate into formal German.
/// glossary:
///   - term: 魔王
///     translation: Demon Lord
/// ```
pub struct FilePresetProvider {
    path: PathBuf,
}

impl FilePresetProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GlossaryProvider for FilePresetProvider {
    fn load(&self) -> DomainResult<PromptPreset> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            DomainError::ConfigInvalid(format!("preset {} unreadable: {e}", self.path.display()))
        })?;
        let preset: PromptPreset = serde_yaml::from_str(&raw).map_err(|e| {
            DomainError::ConfigInvalid(format!("preset {} malformed: {e}", self.path.display()))
        })?;
        debug!(
            path = %self.path.display(),
            terms = preset.glossary.len(),
            has_instructions = preset.instructions.is_some(),
            "preset loaded"
        );
        Ok(preset)
    }
}

/// Provider used when the caller supplies no preset file.
#[derive(Default)]
pub struct EmptyPresetProvider;

impl GlossaryProvider for EmptyPresetProvider {
    fn load(&self) -> DomainResult<PromptPreset> {
        Ok(PromptPreset::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_full_preset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "instructions: Translate into formal German.\nglossary:\n  - term: cat\n    translation: Katze\n  - term: dog\n    translation: Hund"
        )
        .unwrap();
        file.flush().unwrap();

        let preset = FilePresetProvider::new(file.path()).load().unwrap();
        assert_eq!(
            preset.instructions.as_deref(),
            Some("Translate into formal German.")
        );
        assert_eq!(preset.glossary.len(), 2);
        assert_eq!(preset.glossary[0].term, "cat");
        assert_eq!(preset.glossary[1].translation, "Hund");
    }

    #[test]
    fn test_load_glossary_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "glossary:\n  - term: a\n    translation: b").unwrap();
        file.flush().unwrap();

        let preset = FilePresetProvider::new(file.path()).load().unwrap();
        assert!(preset.instructions.is_none());
        assert_eq!(preset.glossary.len(), 1);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = FilePresetProvider::new("/nonexistent/preset.yaml").load();
        assert!(matches!(result, Err(DomainError::ConfigInvalid(_))));
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "glossary: [unbalanced").unwrap();
        file.flush().unwrap();

        let result = FilePresetProvider::new(file.path()).load();
        assert!(matches!(result, Err(DomainError::ConfigInvalid(_))));
    }
}
