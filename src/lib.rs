//! Dragoman - Browser-Driven Bulk Translation Orchestrator
//!
//! Dragoman drives an externally rendered conversational web application
//! through an automation surface to translate large texts chunk by chunk,
//! reliably, despite that interface being slow, stateful, occasionally
//! erroring, and reachable by at most one automation client at a time.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors, and the ports behind which
//!   the UI binding and process control live
//! - **Application Layer** (`application`): The orchestration core: ownership
//!   arbitration, runtime lifecycle, completion detection, session
//!   continuity, and the chunked pipeline
//! - **Adapters** (`adapters`): Native process control, preset loading, and
//!   scripted simulation surfaces
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use dragoman::application::TranslationPipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Wire a surface, arbiter, detector, and policy, then translate.
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use application::{
    CancelFlag, CompletionDetector, ContinuityPolicy, OwnershipArbiter, PipelineEvent,
    PipelineFailure, RuntimeLifecycle, TranslationPipeline,
};
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, DetectorConfig, LeaseHolder, LeaseTransition, LoggingConfig, PipelineConfig,
    PolicyConfig, RuntimeConfig, SessionState, SurfaceObservation, TurnOutcome, WorkUnit,
};
pub use domain::ports::{AutomationSurface, GlossaryProvider, ProcessControl, PromptPreset};
pub use infrastructure::config::{ConfigError, ConfigLoader};
