//! Component registry and table -> subscriber inverse index.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::{CdcError, Result};
use crate::event::SourceTable;
use crate::traits::Subscriber;

/// Health status of a registered component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is delivering normally
    Active,
    /// The component's last delivery failed; only
    /// [`SubscriberRegistry::set_status`] restores `Active`
    Error,
}

impl ComponentStatus {
    /// Convert to string representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ComponentStatus::Active => "active",
            ComponentStatus::Error => "error",
        }
    }
}

/// Metadata the registry keeps per component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentDescriptor {
    /// Unique component name; re-registering a name replaces the prior entry
    pub name:          String,
    /// Component version string, informational
    pub version:       String,
    /// Current health status
    pub status:        ComponentStatus,
    /// When the component was registered or last had its status changed
    pub last_seen:     DateTime<Utc>,
    /// The non-empty set of monitored tables the component subscribes to
    pub subscriptions: BTreeSet<SourceTable>,
}

/// A registration request: metadata plus the dispatchable instance.
///
/// The instance is an `Option` only so the legacy metadata-only shape is
/// expressible at the API boundary; [`SubscriberRegistry::register`] rejects
/// it, because a descriptor without an instance can never receive events.
#[derive(Clone)]
pub struct Registration {
    /// Component name
    pub name:          String,
    /// Component version
    pub version:       String,
    /// Monitored tables to subscribe to
    pub subscriptions: BTreeSet<SourceTable>,
    /// The subscriber instance events are delivered to
    pub instance:      Option<Arc<dyn Subscriber>>,
}

impl Registration {
    /// Start a registration for `name`
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name:          name.into(),
            version:       version.into(),
            subscriptions: BTreeSet::new(),
            instance:      None,
        }
    }

    /// Subscribe to one monitored table
    #[must_use]
    pub fn subscribe(mut self, table: SourceTable) -> Self {
        self.subscriptions.insert(table);
        self
    }

    /// Attach the subscriber instance
    #[must_use]
    pub fn with_instance(mut self, instance: Arc<dyn Subscriber>) -> Self {
        self.instance = Some(instance);
        self
    }
}

struct Registered {
    descriptor: ComponentDescriptor,
    instance:   Arc<dyn Subscriber>,
}

#[derive(Default)]
struct RegistryState {
    components: HashMap<String, Registered>,
    by_table:   HashMap<SourceTable, BTreeSet<String>>,
}

impl RegistryState {
    fn unlink(&mut self, name: &str, subscriptions: &BTreeSet<SourceTable>) {
        for table in subscriptions {
            if let Some(names) = self.by_table.get_mut(table) {
                names.remove(name);
                if names.is_empty() {
                    self.by_table.remove(table);
                }
            }
        }
    }
}

/// Component table plus table -> subscriber inverse index.
///
/// One lock guards both maps so that for every `(table, name)` pair in the
/// inverse index there is always a matching descriptor with `table` in its
/// subscription set. Reads return snapshot copies; no caller iterates under
/// the lock.
#[derive(Default)]
pub struct SubscriberRegistry {
    state: RwLock<RegistryState>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component, replacing any prior registration of the same
    /// name ("latest wins").
    ///
    /// Stamps the descriptor `Active` with `last_seen = now`.
    ///
    /// # Errors
    ///
    /// `NameEmpty` for an empty name, `NoSubscriptions` for an empty
    /// subscription set, `MissingInstance` when no instance is attached.
    pub fn register(&self, registration: Registration) -> Result<()> {
        if registration.name.is_empty() {
            return Err(CdcError::NameEmpty);
        }
        if registration.subscriptions.is_empty() {
            return Err(CdcError::NoSubscriptions {
                name: registration.name,
            });
        }
        let Some(instance) = registration.instance else {
            return Err(CdcError::MissingInstance {
                name: registration.name,
            });
        };

        let mut state = self.state.write();

        // On replace, drop the old inverse-index pairs before inserting the
        // new ones; the old subscription set may differ.
        if let Some(old) = state.components.remove(&registration.name) {
            let subscriptions = old.descriptor.subscriptions;
            state.unlink(&registration.name, &subscriptions);
        }

        for table in &registration.subscriptions {
            state
                .by_table
                .entry(*table)
                .or_default()
                .insert(registration.name.clone());
        }

        tracing::debug!(
            component = %registration.name,
            subscriptions = registration.subscriptions.len(),
            "component registered"
        );

        state.components.insert(
            registration.name.clone(),
            Registered {
                descriptor: ComponentDescriptor {
                    name:          registration.name,
                    version:       registration.version,
                    status:        ComponentStatus::Active,
                    last_seen:     Utc::now(),
                    subscriptions: registration.subscriptions,
                },
                instance,
            },
        );

        Ok(())
    }

    /// Remove a component and all its inverse-index entries.
    ///
    /// # Errors
    ///
    /// `UnknownComponent` if no component of that name is registered.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let mut state = self.state.write();
        let Some(removed) = state.components.remove(name) else {
            return Err(CdcError::UnknownComponent {
                name: name.to_string(),
            });
        };
        let subscriptions = removed.descriptor.subscriptions;
        state.unlink(name, &subscriptions);

        tracing::debug!(component = %name, "component unregistered");
        Ok(())
    }

    /// Set a component's status and bump its `last_seen`.
    ///
    /// # Errors
    ///
    /// `UnknownComponent` if no component of that name is registered.
    pub fn set_status(&self, name: &str, status: ComponentStatus) -> Result<()> {
        let mut state = self.state.write();
        let Some(registered) = state.components.get_mut(name) else {
            return Err(CdcError::UnknownComponent {
                name: name.to_string(),
            });
        };
        registered.descriptor.status = status;
        registered.descriptor.last_seen = Utc::now();
        Ok(())
    }

    /// Snapshot of the names subscribed to `table`, in name order
    #[must_use]
    pub fn subscribers_of(&self, table: SourceTable) -> Vec<String> {
        self.state
            .read()
            .by_table
            .get(&table)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of `(name, instance)` pairs subscribed to `table`.
    ///
    /// The dispatch loop iterates this copy so `on_event` never runs under
    /// the registry lock.
    #[must_use]
    pub fn dispatch_targets(&self, table: SourceTable) -> Vec<(String, Arc<dyn Subscriber>)> {
        let state = self.state.read();
        state
            .by_table
            .get(&table)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| {
                        state
                            .components
                            .get(name)
                            .map(|r| (name.clone(), Arc::clone(&r.instance)))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of one component's descriptor
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<ComponentDescriptor> {
        self.state
            .read()
            .components
            .get(name)
            .map(|r| r.descriptor.clone())
    }

    /// Snapshot of every descriptor, in no particular order
    #[must_use]
    pub fn all_descriptors(&self) -> Vec<ComponentDescriptor> {
        self.state
            .read()
            .components
            .values()
            .map(|r| r.descriptor.clone())
            .collect()
    }

    /// Number of registered components
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().components.len()
    }

    /// Check whether no component is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().components.is_empty()
    }

    /// Number of components currently in `Active` status
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state
            .read()
            .components
            .values()
            .filter(|r| r.descriptor.status == ComponentStatus::Active)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::RecordingSubscriber;

    fn recording() -> Arc<dyn Subscriber> {
        Arc::new(RecordingSubscriber::new())
    }

    fn registration(name: &str) -> Registration {
        Registration::new(name, "1.0.0")
            .subscribe(SourceTable::Tables)
            .with_instance(recording())
    }

    #[test]
    fn test_register_stamps_active() {
        let registry = SubscriberRegistry::new();
        registry.register(registration("schema-cache")).expect("register");

        let descriptor = registry.descriptor("schema-cache").expect("descriptor");
        assert_eq!(descriptor.status, ComponentStatus::Active);
        assert_eq!(descriptor.version, "1.0.0");
        assert_eq!(registry.subscribers_of(SourceTable::Tables), vec!["schema-cache"]);
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let registry = SubscriberRegistry::new();
        let err = registry.register(registration("")).unwrap_err();
        assert!(matches!(err, CdcError::NameEmpty));
    }

    #[test]
    fn test_register_rejects_empty_subscriptions() {
        let registry = SubscriberRegistry::new();
        let err = registry
            .register(Registration::new("c", "1").with_instance(recording()))
            .unwrap_err();
        assert!(matches!(err, CdcError::NoSubscriptions { .. }));
    }

    #[test]
    fn test_register_rejects_missing_instance() {
        let registry = SubscriberRegistry::new();
        let err = registry
            .register(Registration::new("c", "1").subscribe(SourceTable::Tables))
            .unwrap_err();
        assert!(matches!(err, CdcError::MissingInstance { .. }));
    }

    #[test]
    fn test_replace_rewrites_inverse_index() {
        let registry = SubscriberRegistry::new();
        registry.register(registration("c")).expect("first register");

        // Same name, different subscription set: latest wins.
        registry
            .register(
                Registration::new("c", "2.0.0")
                    .subscribe(SourceTable::TableFiles)
                    .with_instance(recording()),
            )
            .expect("replace");

        assert!(registry.subscribers_of(SourceTable::Tables).is_empty());
        assert_eq!(registry.subscribers_of(SourceTable::TableFiles), vec!["c"]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.descriptor("c").expect("descriptor").version, "2.0.0");
    }

    #[test]
    fn test_unregister_clears_inverse_index() {
        let registry = SubscriberRegistry::new();
        registry.register(registration("c")).expect("register");

        registry.unregister("c").expect("unregister");

        assert!(registry.is_empty());
        assert!(registry.subscribers_of(SourceTable::Tables).is_empty());
        assert!(registry.descriptor("c").is_none());
    }

    #[test]
    fn test_unregister_unknown_component() {
        let registry = SubscriberRegistry::new();
        let err = registry.unregister("ghost").unwrap_err();
        assert!(matches!(err, CdcError::UnknownComponent { .. }));
    }

    #[test]
    fn test_set_status() {
        let registry = SubscriberRegistry::new();
        registry.register(registration("c")).expect("register");

        registry.set_status("c", ComponentStatus::Error).expect("set error");
        assert_eq!(
            registry.descriptor("c").expect("descriptor").status,
            ComponentStatus::Error
        );
        assert_eq!(registry.active_count(), 0);

        registry.set_status("c", ComponentStatus::Active).expect("set active");
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_reregister_equals_fresh_registration() {
        let fresh = SubscriberRegistry::new();
        fresh.register(registration("c")).expect("fresh register");

        let cycled = SubscriberRegistry::new();
        cycled.register(registration("c")).expect("register");
        cycled.unregister("c").expect("unregister");
        cycled.register(registration("c")).expect("re-register");

        for table in SourceTable::ALL {
            assert_eq!(cycled.subscribers_of(table), fresh.subscribers_of(table));
        }
    }

    #[test]
    fn test_dispatch_targets_snapshot() {
        let registry = SubscriberRegistry::new();
        registry.register(registration("a")).expect("register a");
        registry
            .register(
                Registration::new("b", "1")
                    .subscribe(SourceTable::Tables)
                    .subscribe(SourceTable::TableFiles)
                    .with_instance(recording()),
            )
            .expect("register b");

        let targets = registry.dispatch_targets(SourceTable::Tables);
        let names: Vec<&str> = targets.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        assert_eq!(registry.dispatch_targets(SourceTable::TableFiles).len(), 1);
        assert!(registry.dispatch_targets(SourceTable::TableStatistics).is_empty());
    }
}
