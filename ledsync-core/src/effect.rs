//! Effect replication: master buffers the application's visual-state snapshot and broadcasts it
//! periodically; members overwrite their copy on every receipt. No ack, no versioning.

use crate::timer::Interval;

/// Size of the opaque application snapshot.
pub const EFFECT_STATE_LEN: usize = 32;

/// Fixed-size snapshot of application visual state. Opaque to the sync layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectSyncState([u8; EFFECT_STATE_LEN]);

impl EffectSyncState {
    pub fn from_bytes(bytes: [u8; EFFECT_STATE_LEN]) -> Self {
        EffectSyncState(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; EFFECT_STATE_LEN] {
        &self.0
    }
}

impl Default for EffectSyncState {
    fn default() -> Self {
        EffectSyncState([0u8; EFFECT_STATE_LEN])
    }
}

/// Holds the cached snapshot and the broadcast schedule.
pub struct EffectReplicator {
    enabled: bool,
    state: EffectSyncState,
    /// Set once the local application has supplied a snapshot to publish.
    has_local: bool,
    interval: Interval,
}

impl EffectReplicator {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            enabled: true,
            state: EffectSyncState::default(),
            has_local: false,
            interval: Interval::new(interval_ms),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn state(&self) -> EffectSyncState {
        self.state
    }

    /// Buffer the latest local snapshot; sent on the next due broadcast.
    pub fn set_local(&mut self, state: EffectSyncState) {
        self.state = state;
        self.has_local = true;
    }

    /// Snapshot to broadcast now, if replication is enabled, something was set, and the interval elapsed.
    pub fn due(&mut self, now_ms: u64) -> Option<EffectSyncState> {
        if !self.enabled || !self.has_local {
            return None;
        }
        if self.interval.poll(now_ms) {
            Some(self.state)
        } else {
            None
        }
    }

    /// Overwrite the cached snapshot with one received from the master.
    pub fn on_received(&mut self, state: EffectSyncState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(b: u8) -> EffectSyncState {
        EffectSyncState::from_bytes([b; EFFECT_STATE_LEN])
    }

    #[test]
    fn nothing_sent_before_local_state() {
        let mut r = EffectReplicator::new(100);
        assert_eq!(r.due(0), None);
        r.set_local(snapshot(1));
        assert_eq!(r.due(0), Some(snapshot(1)));
        assert_eq!(r.due(50), None);
        assert_eq!(r.due(100), Some(snapshot(1)));
    }

    #[test]
    fn disabled_suppresses_broadcast() {
        let mut r = EffectReplicator::new(100);
        r.set_local(snapshot(2));
        r.set_enabled(false);
        assert!(!r.is_enabled());
        assert_eq!(r.due(1000), None);
        r.set_enabled(true);
        assert_eq!(r.due(1000), Some(snapshot(2)));
    }

    #[test]
    fn received_overwrites_wholesale() {
        let mut r = EffectReplicator::new(100);
        r.on_received(snapshot(5));
        r.on_received(snapshot(4));
        assert_eq!(r.state(), snapshot(4));
        // A member never publishes what it received.
        assert_eq!(r.due(1000), None);
    }
}
