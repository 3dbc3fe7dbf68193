//! Typed change notifications.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::playing::SoundId;

/// What a [`VolumeChanged`](MixerEvent::VolumeChanged) event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeTarget {
    Master,
    Channel(String),
    Sound(SoundId),
}

/// A state change announced by the mixer.
#[derive(Debug, Clone, PartialEq)]
pub enum MixerEvent {
    /// A channel was created.
    ChannelsUpdated,
    /// A sound was registered or removed.
    PlayingSoundsUpdated,
    /// A volume stage changed (set, mute or unmute).
    VolumeChanged { target: VolumeTarget, volume: f32 },
}

/// Event kinds, for filtered subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChannelsUpdated,
    PlayingSoundsUpdated,
    VolumeChanged,
}

impl MixerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MixerEvent::ChannelsUpdated => EventKind::ChannelsUpdated,
            MixerEvent::PlayingSoundsUpdated => EventKind::PlayingSoundsUpdated,
            MixerEvent::VolumeChanged { .. } => EventKind::VolumeChanged,
        }
    }
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&MixerEvent) + Send + Sync>;

struct Entry {
    id: ListenerId,
    kind: Option<EventKind>,
    listener: Listener,
}

/// Fan-out of [`MixerEvent`]s to registered listeners.
///
/// Listeners run on the thread that caused the change, with no mixer lock
/// held, so they may call back into the mixer.
#[derive(Default)]
pub struct EventBus {
    entries: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for every event.
    pub fn subscribe(&self, f: impl Fn(&MixerEvent) + Send + Sync + 'static) -> ListenerId {
        self.add(None, Arc::new(f))
    }

    /// Registers a listener for one kind of event.
    pub fn on(&self, kind: EventKind, f: impl Fn(&MixerEvent) + Send + Sync + 'static) -> ListenerId {
        self.add(Some(kind), Arc::new(f))
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn emit(&self, event: MixerEvent) {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .entries
            .read()
            .iter()
            .filter(|e| e.kind.is_none_or(|k| k == kind))
            .map(|e| e.listener.clone())
            .collect();
        for listener in targets {
            listener(&event);
        }
    }

    fn add(&self, kind: Option<EventKind>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push(Entry { id, kind, listener });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_filtered_subscription() {
        let bus = EventBus::new();
        let all = Arc::new(AtomicUsize::new(0));
        let volume = Arc::new(AtomicUsize::new(0));

        let counter = all.clone();
        bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = volume.clone();
        bus.on(EventKind::VolumeChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(MixerEvent::ChannelsUpdated);
        bus.emit(MixerEvent::VolumeChanged {
            target: VolumeTarget::Master,
            volume: 0.5,
        });

        assert_eq!(all.load(Ordering::SeqCst), 2);
        assert_eq!(volume.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(MixerEvent::PlayingSoundsUpdated);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_subscribe_during_emit() {
        let bus = Arc::new(EventBus::new());
        let inner = bus.clone();
        bus.subscribe(move |_| {
            inner.subscribe(|_| {});
        });
        bus.emit(MixerEvent::ChannelsUpdated);
        assert_eq!(bus.listener_count(), 2);
    }
}
