//! Adapters: concrete implementations of the domain ports.

pub mod native;
pub mod preset;
pub mod scripted;

pub use native::NativeProcessControl;
pub use preset::{EmptyPresetProvider, FilePresetProvider};
pub use scripted::{ScriptedProcessControl, ScriptedSurface, TurnScript};
