pub mod automation;
pub mod glossary;
pub mod process;

pub use automation::AutomationSurface;
pub use glossary::{GlossaryEntry, GlossaryProvider, PromptPreset};
pub use process::ProcessControl;
