//! Observer fan-out for the controller's state, time, and error events.
//!
//! Each event kind gets its own small observer list with a typed payload,
//! rather than one observer list with a big tagged-union `Event` — so a
//! caller only interested in `timeUpdate` doesn't have to match through
//! every other kind to ignore them.

use std::sync::Mutex;

use crate::controller::State;
use crate::error::ErrorKind;

type Observer<T> = Box<dyn Fn(&T) + Send>;

/// A small fan-out list for one event kind.
pub struct Observers<T> {
    listeners: Mutex<Vec<Observer<T>>>,
}

impl<T> Observers<T> {
    fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Registers a listener, invoked on every future emission.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + 'static) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Box::new(listener));
        }
    }

    /// Invokes every registered listener with `payload`.
    pub fn emit(&self, payload: &T) {
        if let Ok(listeners) = self.listeners.lock() {
            for listener in listeners.iter() {
                listener(payload);
            }
        }
    }

    /// Drops all registered listeners.
    pub fn clear(&self) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.clear();
        }
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload for `durationChange`/`timeUpdate`: media time in seconds.
pub type MediaTime = f64;

/// Payload for `error`: the kind plus a human-readable detail string
/// (the underlying [`crate::error::Error`] isn't `Clone`, so listeners
/// get the parts that matter for UI/telemetry rather than the original).
#[derive(Clone, Debug)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
}

/// Payload for `tracksChange`/`audioTrackChange`/`subtitleTrackChange`:
/// the newly active stream index, or `None` when a track is deselected.
pub type TrackIndex = Option<u32>;

/// The full set of observer lists the controller and track manager emit
/// into. Intentionally has no "catch-all" subscription; embed this in
/// the facade that owns a [`crate::controller::Controller`] and wire up
/// only the event kinds the embedder cares about.
#[derive(Default)]
pub struct Events {
    pub load_start: Observers<()>,
    pub load_end: Observers<()>,
    pub state_change: Observers<State>,
    pub time_update: Observers<MediaTime>,
    pub duration_change: Observers<MediaTime>,
    pub error: Observers<ErrorEvent>,
    pub audio_track_change: Observers<TrackIndex>,
    pub subtitle_track_change: Observers<TrackIndex>,
    pub tracks_change: Observers<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn emit_invokes_all_subscribers() {
        let observers: Observers<MediaTime> = Observers::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        observers.subscribe(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = count.clone();
        observers.subscribe(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        observers.emit(&1.5);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_removes_subscribers() {
        let observers: Observers<()> = Observers::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        observers.subscribe(move |()| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        observers.clear();
        observers.emit(&());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
