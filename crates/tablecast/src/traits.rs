//! The capability contract between the bus and embedding components.

use async_trait::async_trait;

use crate::error::Result;
use crate::event::ChangeEvent;

/// A component that consumes change events for one or more source tables.
///
/// Instances are shared with their originating component (`Arc<dyn
/// Subscriber>`) and must outlive their registration. The dispatch loop
/// calls `on_event` synchronously and expects it to return promptly;
/// subscribers that need slow work must hand it off to their own tasks.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Deliver one change event.
    ///
    /// Must be idempotent with respect to the event id: the bus guarantees
    /// at-least-once delivery across the database boundary, so a subscriber
    /// may see an id again after a crash-restart of the embedding process.
    ///
    /// # Errors
    ///
    /// An error marks the component `Error` in the registry; it does not
    /// stop delivery of the event to other subscribers, and the event is
    /// still marked processed afterwards.
    async fn on_event(&self, event: &ChangeEvent) -> Result<()>;

    /// Liveness probe. The bus treats the result as opaque health signal.
    ///
    /// # Errors
    ///
    /// Returns whatever the component considers an unhealthy state.
    async fn on_health(&self) -> Result<()>;

    /// Ask the component to rebuild its state from the authoritative
    /// source. This is the recovery path for a component whose status was
    /// set to `Error`: after a successful refresh the embedder flips it
    /// back via `set_status`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuild failed; the component stays in its
    /// current status.
    async fn on_refresh(&self) -> Result<()>;
}
