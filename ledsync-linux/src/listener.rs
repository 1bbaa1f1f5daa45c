//! Sync notifications for a headless host: everything goes to the log.

use ledsync_core::{DeviceId, EffectSyncState, GroupId, PeerAddress, SyncListener};

#[derive(Default)]
pub struct LogListener {
    effect_updates: u64,
}

impl SyncListener for LogListener {
    fn on_device_discovered(&mut self, device_id: DeviceId, address: PeerAddress) {
        tracing::info!(%device_id, %address, "device discovered");
    }

    fn on_group_found(&mut self, group_id: GroupId, master_device_id: DeviceId) {
        tracing::info!(group_id = format_args!("{:08x}", group_id), master = %master_device_id, "group found");
    }

    fn on_group_created(&mut self, group_id: GroupId) {
        tracing::info!(group_id = format_args!("{:08x}", group_id), "group created");
    }

    fn on_group_joined(&mut self, group_id: GroupId) {
        tracing::info!(group_id = format_args!("{:08x}", group_id), "joined group");
    }

    fn on_group_left(&mut self, group_id: GroupId) {
        tracing::info!(group_id = format_args!("{:08x}", group_id), "left group");
        self.effect_updates = 0;
    }

    fn on_time_synced(&mut self, offset_ms: i64) {
        tracing::info!(offset_ms, "clock synced to master");
    }

    // Arrives every effect interval; only the first one per group is worth an info line.
    fn on_effect_state_received(&mut self, state: &EffectSyncState) {
        self.effect_updates += 1;
        if self.effect_updates == 1 {
            tracing::info!("receiving effect state from master");
        }
        tracing::trace!(bytes = ?state.as_bytes(), "effect state");
    }
}
