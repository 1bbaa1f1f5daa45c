//! Application-facing notifications. The core emits these as actions; hosts route them to a
//! `SyncListener`.

use crate::effect::EffectSyncState;
use crate::identity::{DeviceId, GroupId, PeerAddress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// First heartbeat from a device not currently in the peer directory.
    DeviceDiscovered {
        device_id: DeviceId,
        address: PeerAddress,
    },
    /// First announcement of a group not currently in the group directory.
    GroupFound {
        group_id: GroupId,
        master_device_id: DeviceId,
    },
    GroupCreated { group_id: GroupId },
    GroupJoined { group_id: GroupId },
    /// Left voluntarily, disbanded by the master, or master lost.
    GroupLeft { group_id: GroupId },
    /// First offset estimate after joining.
    TimeSynced { offset_ms: i64 },
    EffectStateReceived(EffectSyncState),
}

/// Receives sync notifications. Every method defaults to a no-op.
pub trait SyncListener {
    fn on_device_discovered(&mut self, _device_id: DeviceId, _address: PeerAddress) {}
    fn on_group_found(&mut self, _group_id: GroupId, _master_device_id: DeviceId) {}
    fn on_group_created(&mut self, _group_id: GroupId) {}
    fn on_group_joined(&mut self, _group_id: GroupId) {}
    fn on_group_left(&mut self, _group_id: GroupId) {}
    fn on_time_synced(&mut self, _offset_ms: i64) {}
    fn on_effect_state_received(&mut self, _state: &EffectSyncState) {}
}

impl SyncEvent {
    pub fn dispatch(&self, listener: &mut dyn SyncListener) {
        match self {
            SyncEvent::DeviceDiscovered { device_id, address } => {
                listener.on_device_discovered(*device_id, *address)
            }
            SyncEvent::GroupFound {
                group_id,
                master_device_id,
            } => listener.on_group_found(*group_id, *master_device_id),
            SyncEvent::GroupCreated { group_id } => listener.on_group_created(*group_id),
            SyncEvent::GroupJoined { group_id } => listener.on_group_joined(*group_id),
            SyncEvent::GroupLeft { group_id } => listener.on_group_left(*group_id),
            SyncEvent::TimeSynced { offset_ms } => listener.on_time_synced(*offset_ms),
            SyncEvent::EffectStateReceived(state) => listener.on_effect_state_received(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        created: Vec<GroupId>,
        left: Vec<GroupId>,
        synced: Vec<i64>,
    }

    impl SyncListener for Recorder {
        fn on_group_created(&mut self, group_id: GroupId) {
            self.created.push(group_id);
        }
        fn on_group_left(&mut self, group_id: GroupId) {
            self.left.push(group_id);
        }
        fn on_time_synced(&mut self, offset_ms: i64) {
            self.synced.push(offset_ms);
        }
    }

    #[test]
    fn dispatch_routes_to_matching_method() {
        let mut rec = Recorder::default();
        SyncEvent::GroupCreated { group_id: 7 }.dispatch(&mut rec);
        SyncEvent::GroupLeft { group_id: 7 }.dispatch(&mut rec);
        SyncEvent::TimeSynced { offset_ms: -12 }.dispatch(&mut rec);
        // Unhandled events fall through to the default no-op.
        SyncEvent::GroupJoined { group_id: 9 }.dispatch(&mut rec);
        assert_eq!(rec.created, vec![7]);
        assert_eq!(rec.left, vec![7]);
        assert_eq!(rec.synced, vec![-12]);
    }
}
