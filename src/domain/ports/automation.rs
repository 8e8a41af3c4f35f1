//! Automation surface port - interface to the observable conversational UI.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::SurfaceObservation;

/// Trait for the controllable conversational web interface.
///
/// The concrete element-selection strategy against the target page is owned
/// entirely by implementations; the orchestration core only writes, sends,
/// observes, and stops. `observe` returns busy state, latest response text,
/// and any error banner as one atomic sample so the completion detector never
/// correlates fields read at different instants.
#[async_trait]
pub trait AutomationSurface: Send + Sync {
    /// Write `text` into the interface's input box, replacing prior content.
    async fn write_input(&self, text: &str) -> DomainResult<()>;

    /// Click send. `Ok(false)` means the control was found but refused the
    /// click (disabled button, input rejected).
    async fn click_send(&self) -> DomainResult<bool>;

    /// Take one sample of the interface state.
    async fn observe(&self) -> DomainResult<SurfaceObservation>;

    /// Abandon the current conversation thread and start a fresh one.
    async fn reset_conversation(&self) -> DomainResult<()>;

    /// Best-effort stop of an in-flight generation.
    async fn stop_generation(&self) -> DomainResult<()>;
}
