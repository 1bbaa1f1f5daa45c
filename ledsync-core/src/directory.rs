//! Peer and group directories: what this device has recently heard on the broadcast medium.
//! Entries are created by heartbeats/announcements and removed only by the timeout sweeps.

use std::collections::HashMap;

use crate::identity::{DeviceId, GroupId, PeerAddress};

/// A peer heard via heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub device_id: DeviceId,
    pub address: PeerAddress,
    pub last_seen_ms: u64,
}

/// A group heard via its master's announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupAdvert {
    pub group_id: GroupId,
    pub master_device_id: DeviceId,
    pub master_address: PeerAddress,
    pub last_seen_ms: u64,
}

/// Result of recording a heartbeat or announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// Sender is this device.
    SelfFiltered,
    New,
    Refreshed,
}

/// Recently-heard devices keyed by address.
pub struct PeerDirectory {
    own_address: PeerAddress,
    timeout_ms: u64,
    devices: HashMap<PeerAddress, DiscoveredDevice>,
}

impl PeerDirectory {
    pub fn new(own_address: PeerAddress, timeout_ms: u64) -> Self {
        Self {
            own_address,
            timeout_ms,
            devices: HashMap::new(),
        }
    }

    pub fn on_heartbeat(&mut self, sender: PeerAddress, device_id: DeviceId, now_ms: u64) -> Upsert {
        if sender == self.own_address {
            return Upsert::SelfFiltered;
        }
        let entry = DiscoveredDevice {
            device_id,
            address: sender,
            last_seen_ms: now_ms,
        };
        match self.devices.insert(sender, entry) {
            Some(_) => Upsert::Refreshed,
            None => Upsert::New,
        }
    }

    /// Remove every device not heard from for longer than the discovery timeout.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<DiscoveredDevice> {
        let timeout = self.timeout_ms;
        let stale: Vec<PeerAddress> = self
            .devices
            .values()
            .filter(|d| now_ms.saturating_sub(d.last_seen_ms) > timeout)
            .map(|d| d.address)
            .collect();
        stale
            .iter()
            .filter_map(|addr| self.devices.remove(addr))
            .collect()
    }

    pub fn get(&self, address: &PeerAddress) -> Option<&DiscoveredDevice> {
        self.devices.get(address)
    }

    /// True if `address` has a heartbeat younger than `max_age_ms`.
    pub fn is_fresh(&self, address: &PeerAddress, now_ms: u64, max_age_ms: u64) -> bool {
        self.devices
            .get(address)
            .map(|d| now_ms.saturating_sub(d.last_seen_ms) < max_age_ms)
            .unwrap_or(false)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DiscoveredDevice> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Advertised groups keyed by group ID.
pub struct GroupDirectory {
    own_address: PeerAddress,
    timeout_ms: u64,
    groups: HashMap<GroupId, GroupAdvert>,
}

impl GroupDirectory {
    pub fn new(own_address: PeerAddress, timeout_ms: u64) -> Self {
        Self {
            own_address,
            timeout_ms,
            groups: HashMap::new(),
        }
    }

    pub fn on_announce(
        &mut self,
        sender: PeerAddress,
        group_id: GroupId,
        master_device_id: DeviceId,
        now_ms: u64,
    ) -> Upsert {
        if sender == self.own_address {
            return Upsert::SelfFiltered;
        }
        let advert = GroupAdvert {
            group_id,
            master_device_id,
            master_address: sender,
            last_seen_ms: now_ms,
        };
        match self.groups.insert(group_id, advert) {
            Some(_) => Upsert::Refreshed,
            None => Upsert::New,
        }
    }

    /// Remove every group whose master has not announced for longer than the timeout.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<GroupAdvert> {
        let timeout = self.timeout_ms;
        let stale: Vec<GroupId> = self
            .groups
            .values()
            .filter(|g| now_ms.saturating_sub(g.last_seen_ms) > timeout)
            .map(|g| g.group_id)
            .collect();
        stale
            .iter()
            .filter_map(|id| self.groups.remove(id))
            .collect()
    }

    pub fn get(&self, group_id: GroupId) -> Option<&GroupAdvert> {
        self.groups.get(&group_id)
    }

    /// First advert in iteration order. No ranking between candidates.
    pub fn groups(&self) -> impl Iterator<Item = &GroupAdvert> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
