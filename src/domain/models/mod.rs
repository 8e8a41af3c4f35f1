pub mod config;
pub mod lease;
pub mod runtime;
pub mod session;
pub mod work_unit;

pub use config::{
    Config, DetectorConfig, LoggingConfig, PipelineConfig, PolicyConfig, RuntimeConfig,
};
pub use lease::{LeaseHolder, LeaseTransition};
pub use runtime::{RuntimeHandle, RuntimeManifest, RuntimeRecord};
pub use session::{SessionBounds, SessionState};
pub use work_unit::{PartialResults, SurfaceObservation, TurnOutcome, WorkUnit};
