//! Mock subscribers for tests.
//!
//! Published behind the `testing` feature so downstream crates can drive
//! the bus in their own tests without a real component.

/// Mock implementations of the [`crate::traits::Subscriber`] capability
pub mod mocks {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::{CdcError, Result};
    use crate::event::ChangeEvent;
    use crate::traits::Subscriber;

    /// Subscriber that records every delivery
    #[derive(Default)]
    pub struct RecordingSubscriber {
        seen:      Mutex<Vec<ChangeEvent>>,
        refreshes: AtomicUsize,
    }

    impl RecordingSubscriber {
        /// Create an empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Ids of every delivered event, in delivery order
        #[must_use]
        pub fn event_ids(&self) -> Vec<i64> {
            self.seen.lock().iter().map(ChangeEvent::id).collect()
        }

        /// Every delivered event, in delivery order
        #[must_use]
        pub fn seen(&self) -> Vec<ChangeEvent> {
            self.seen.lock().clone()
        }

        /// Number of deliveries so far
        #[must_use]
        pub fn len(&self) -> usize {
            self.seen.lock().len()
        }

        /// Check whether nothing has been delivered yet
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.seen.lock().is_empty()
        }

        /// Number of `on_refresh` calls so far
        #[must_use]
        pub fn refresh_count(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Subscriber for RecordingSubscriber {
        async fn on_event(&self, event: &ChangeEvent) -> Result<()> {
            self.seen.lock().push(event.clone());
            Ok(())
        }

        async fn on_health(&self) -> Result<()> {
            Ok(())
        }

        async fn on_refresh(&self) -> Result<()> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Subscriber whose `on_event` always fails
    #[derive(Default)]
    pub struct FailingSubscriber {
        attempts: AtomicUsize,
    }

    impl FailingSubscriber {
        /// Create a failing subscriber
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of deliveries attempted against this subscriber
        #[must_use]
        pub fn attempt_count(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Subscriber for FailingSubscriber {
        async fn on_event(&self, event: &ChangeEvent) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(CdcError::Subscriber {
                component: "failing".to_string(),
                reason:    format!("rejecting event {}", event.id()),
            })
        }

        async fn on_health(&self) -> Result<()> {
            Err(CdcError::Subscriber {
                component: "failing".to_string(),
                reason:    "unhealthy".to_string(),
            })
        }

        async fn on_refresh(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Subscriber whose `on_event` panics; used to prove containment
    #[derive(Default)]
    pub struct PanickingSubscriber;

    impl PanickingSubscriber {
        /// Create a panicking subscriber
        #[must_use]
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl Subscriber for PanickingSubscriber {
        async fn on_event(&self, event: &ChangeEvent) -> Result<()> {
            panic!("subscriber panic on event {}", event.id());
        }

        async fn on_health(&self) -> Result<()> {
            Ok(())
        }

        async fn on_refresh(&self) -> Result<()> {
            Ok(())
        }
    }
}
