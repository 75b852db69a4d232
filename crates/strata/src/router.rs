//! # Signal Router
//!
//! Delivers lifecycle events to the roles subscribed to them.
//!
//! Routing is a table, not a broadcast: a linear allocator in the
//! level-CPU role must not reset on `FlushScratch` just because the
//! scratch role uses the same strategy.

use strata_core::{EventResponse, LifecycleEvent};

use crate::config::{MemoryConfig, REFERENCE_ROUTES};
use crate::error::{ConfigError, DispatchError};
use crate::roles::{AllocatorRole, AllocatorRoleSet};

const EVENT_COUNT: usize = LifecycleEvent::ALL.len();

/// Outcome of delivering one event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Subscribers whose state changed.
    pub applied: usize,
    /// Subscribers that had no use for the event.
    pub ignored: usize,
}

/// Event-to-roles routing table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignalRouter {
    routes: [Vec<AllocatorRole>; EVENT_COUNT],
}

impl SignalRouter {
    /// A router with no subscriptions.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The reference routing, the same table [`MemoryConfig::default`]
    /// carries.
    #[must_use]
    pub fn reference() -> Self {
        let mut router = Self::empty();
        for (event, roles) in REFERENCE_ROUTES {
            for &role in roles {
                router.subscribe(event, role);
            }
        }
        router
    }

    /// Builds the routing table from `config`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownEvent`] or [`ConfigError::UnknownRole`].
    pub fn from_config(config: &MemoryConfig) -> Result<Self, ConfigError> {
        let mut router = Self::empty();
        for (event, role) in config.routes()? {
            router.subscribe(event, role);
        }
        Ok(router)
    }

    /// Adds `role` to the subscribers of `event`. Duplicates are ignored.
    pub fn subscribe(&mut self, event: LifecycleEvent, role: AllocatorRole) {
        let subscribers = &mut self.routes[event.index()];
        if !subscribers.contains(&role) {
            subscribers.push(role);
        }
    }

    /// Removes `role` from the subscribers of `event`.
    pub fn unsubscribe(&mut self, event: LifecycleEvent, role: AllocatorRole) {
        self.routes[event.index()].retain(|&subscriber| subscriber != role);
    }

    /// Roles subscribed to `event`, in delivery order.
    #[inline]
    #[must_use]
    pub fn subscribers(&self, event: LifecycleEvent) -> &[AllocatorRole] {
        &self.routes[event.index()]
    }

    /// Delivers `event` to every subscriber, in subscription order.
    ///
    /// Delivery stops at the first failure; subscribers before it have
    /// already applied the event.
    ///
    /// # Errors
    ///
    /// [`DispatchError`] naming the role whose strategy failed.
    pub fn dispatch(&self, event: LifecycleEvent, roles: &mut AllocatorRoleSet<'_>) -> Result<Delivery, DispatchError> {
        let mut delivery = Delivery::default();
        for &role in self.subscribers(event) {
            let response = roles
                .get_mut(role)
                .on_event(event)
                .map_err(|source| DispatchError { event, role, source })?;
            match response {
                EventResponse::Applied => delivery.applied += 1,
                EventResponse::Ignored => delivery.ignored += 1,
            }
        }
        tracing::trace!(%event, applied = delivery.applied, ignored = delivery.ignored, "event dispatched");
        Ok(delivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{AllocError, SystemBlockRegistry};

    #[test]
    fn test_reference_matches_default_config() {
        let router = SignalRouter::from_config(&MemoryConfig::default()).unwrap();
        let reference = SignalRouter::reference();
        for event in LifecycleEvent::ALL {
            let mut from_config = router.subscribers(event).to_vec();
            let mut expected = reference.subscribers(event).to_vec();
            from_config.sort();
            expected.sort();
            assert_eq!(from_config, expected, "{event}");
        }
        assert!(reference.subscribers(LifecycleEvent::GameInit).is_empty());
        assert!(reference.subscribers(LifecycleEvent::LevelLoadComplete).is_empty());
        assert!(reference.subscribers(LifecycleEvent::GameShutdown).is_empty());
        assert_eq!(router, reference);
    }

    #[test]
    fn test_flush_reaches_only_scratch() {
        let registry = SystemBlockRegistry::new();
        let mut roles = AllocatorRoleSet::with_defaults(&registry);
        let router = SignalRouter::reference();

        let scratch = roles.allocate(AllocatorRole::ScratchSpace, 128, 16).unwrap();
        roles.allocate(AllocatorRole::LevelCpu, 128, 16).unwrap();

        let delivery = router.dispatch(LifecycleEvent::FlushScratch, &mut roles).unwrap();
        assert_eq!(delivery, Delivery { applied: 1, ignored: 0 });

        assert_eq!(roles.allocate(AllocatorRole::ScratchSpace, 128, 16).unwrap(), scratch);
        assert_eq!(roles.get(AllocatorRole::LevelCpu).stats().active_bytes(), 128);
    }

    #[test]
    fn test_unload_without_load_reports_role() {
        let registry = SystemBlockRegistry::new();
        let mut roles = AllocatorRoleSet::with_defaults(&registry);

        let err = SignalRouter::reference()
            .dispatch(LifecycleEvent::LevelUnload, &mut roles)
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError {
                event: LifecycleEvent::LevelUnload,
                role: AllocatorRole::LevelGpu,
                source: AllocError::NoMarkerSet,
            }
        );
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut router = SignalRouter::empty();
        router.subscribe(LifecycleEvent::GameInit, AllocatorRole::LevelCpu);
        router.subscribe(LifecycleEvent::GameInit, AllocatorRole::LevelCpu);
        assert_eq!(router.subscribers(LifecycleEvent::GameInit), [AllocatorRole::LevelCpu]);

        let registry = SystemBlockRegistry::new();
        let mut roles = AllocatorRoleSet::with_defaults(&registry);
        let delivery = router.dispatch(LifecycleEvent::GameInit, &mut roles).unwrap();
        assert_eq!(delivery, Delivery { applied: 0, ignored: 1 });

        router.unsubscribe(LifecycleEvent::GameInit, AllocatorRole::LevelCpu);
        assert!(router.subscribers(LifecycleEvent::GameInit).is_empty());
    }
}
