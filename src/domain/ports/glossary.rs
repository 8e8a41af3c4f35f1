//! Glossary preset port - caller-supplied terminology and instructions.

use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// One fixed term translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub term: String,
    pub translation: String,
}

/// Initial glossary pairs and free-text prompt instructions, consumed
/// read-only by the continuity policy's prompt builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptPreset {
    /// Override for the built-in translation instructions.
    #[serde(default)]
    pub instructions: Option<String>,
    /// Terms seeded into the session glossary, in order.
    #[serde(default)]
    pub glossary: Vec<GlossaryEntry>,
}

/// Trait for loading a prompt preset.
pub trait GlossaryProvider: Send + Sync {
    fn load(&self) -> DomainResult<PromptPreset>;
}
