//! Background-side listener registry

use std::collections::{BTreeMap, HashSet};

use fl_core::types::EventKind;

use crate::protocol::{ListenerId, PortId};

#[derive(Debug, Clone)]
struct Registration {
    events: HashSet<EventKind>,
    port: PortId,
}

/// Authoritative map of listener ids to the notification kinds they asked
/// for and the connection they were registered on.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: BTreeMap<ListenerId, Registration>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, port: PortId, events: &[EventKind]) -> ListenerId {
        self.next_id += 1;
        let listener_id = ListenerId(self.next_id);
        self.listeners.insert(
            listener_id,
            Registration {
                events: events.iter().copied().collect(),
                port,
            },
        );
        listener_id
    }

    /// Returns false for an id that is not registered.
    pub fn remove(&mut self, listener_id: ListenerId) -> bool {
        self.listeners.remove(&listener_id).is_some()
    }

    /// Drop every listener registered on a connection.
    pub fn remove_port(&mut self, port: PortId) -> usize {
        let before = self.listeners.len();
        self.listeners.retain(|_, registration| registration.port != port);
        before - self.listeners.len()
    }

    /// Forget every listener. Ids keep increasing afterwards.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Listeners subscribed to `kind`, with their connection.
    pub fn targets(&self, kind: EventKind) -> Vec<(ListenerId, PortId)> {
        self.listeners
            .iter()
            .filter(|(_, registration)| registration.events.contains(&kind))
            .map(|(&listener_id, registration)| (listener_id, registration.port))
            .collect()
    }

    pub fn contains(&self, listener_id: ListenerId) -> bool {
        self.listeners.contains_key(&listener_id)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_by_kind() {
        let mut registry = ListenerRegistry::new();
        let tabs = registry.add(PortId(1), &[EventKind::TabAdded, EventKind::TabClose]);
        let events = registry.add(PortId(2), &[EventKind::LogEventAdded]);

        assert_eq!(registry.targets(EventKind::TabAdded), vec![(tabs, PortId(1))]);
        assert_eq!(registry.targets(EventKind::LogEventAdded), vec![(events, PortId(2))]);
        assert!(registry.targets(EventKind::TabReset).is_empty());
    }

    #[test]
    fn test_ids_not_reused_after_clear() {
        let mut registry = ListenerRegistry::new();
        let first = registry.add(PortId(1), &[EventKind::TabAdded]);
        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.contains(first));

        let second = registry.add(PortId(1), &[EventKind::TabAdded]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_remove_port() {
        let mut registry = ListenerRegistry::new();
        let a = registry.add(PortId(1), &[EventKind::TabAdded]);
        registry.add(PortId(2), &[EventKind::TabAdded]);
        registry.add(PortId(2), &[EventKind::TabReset]);

        assert_eq!(registry.remove_port(PortId(2)), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(a));
        assert!(!registry.remove(a));
    }
}
