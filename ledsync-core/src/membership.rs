//! This device's view of its group: solo, master, or member, plus the roster.

use std::collections::HashMap;

use crate::identity::{DeviceId, GroupId, PeerAddress};
use crate::protocol::Message;

/// One roster entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupMember {
    pub device_id: DeviceId,
    pub address: PeerAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Solo,
    Master,
    Member,
}

/// Group state. Invariant: `group_id == 0` iff not master and no members.
/// A master is always time-synced with offset 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub group_id: GroupId,
    pub master_device_id: DeviceId,
    pub is_master: bool,
    pub members: HashMap<PeerAddress, GroupMember>,
    pub time_synced: bool,
    pub time_offset_ms: i64,
}

impl GroupInfo {
    pub fn solo() -> Self {
        Self {
            group_id: 0,
            master_device_id: DeviceId(0),
            is_master: false,
            members: HashMap::new(),
            time_synced: false,
            time_offset_ms: 0,
        }
    }

    pub fn role(&self) -> Role {
        if self.group_id == 0 {
            Role::Solo
        } else if self.is_master {
            Role::Master
        } else {
            Role::Member
        }
    }

    pub fn is_grouped(&self) -> bool {
        self.group_id != 0
    }

    /// Host a new group with this device as the only member and the time reference.
    pub(crate) fn become_master(&mut self, group_id: GroupId, own: GroupMember) {
        *self = Self {
            group_id,
            master_device_id: own.device_id,
            is_master: true,
            members: HashMap::new(),
            time_synced: true,
            time_offset_ms: 0,
        };
        self.members.insert(own.address, own);
    }

    /// Join as a member. Self is listed optimistically until the master's roster arrives.
    pub(crate) fn become_member(
        &mut self,
        group_id: GroupId,
        master_device_id: DeviceId,
        own: GroupMember,
    ) {
        *self = Self {
            group_id,
            master_device_id,
            is_master: false,
            members: HashMap::new(),
            time_synced: false,
            time_offset_ms: 0,
        };
        self.members.insert(own.address, own);
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::solo();
    }

    /// Returns true if the member was not already listed.
    pub(crate) fn add_member(&mut self, member: GroupMember) -> bool {
        self.members.insert(member.address, member).is_none()
    }

    pub(crate) fn remove_member(&mut self, address: &PeerAddress) -> Option<GroupMember> {
        self.members.remove(address)
    }

    /// Overwrite master and roster from a GROUP_INFO snapshot. Last writer wins.
    pub(crate) fn replace_roster(&mut self, master_device_id: DeviceId, members: &[GroupMember]) {
        self.master_device_id = master_device_id;
        self.members = members.iter().map(|m| (m.address, *m)).collect();
    }

    /// Roster ordered by address so snapshots are stable.
    pub fn roster(&self) -> Vec<GroupMember> {
        let mut members: Vec<GroupMember> = self.members.values().copied().collect();
        members.sort_by_key(|m| m.address);
        members
    }

    pub fn announce_message(&self) -> Message {
        Message::GroupAnnounce {
            group_id: self.group_id,
            master_device_id: self.master_device_id,
        }
    }

    pub fn info_message(&self) -> Message {
        Message::GroupInfo {
            group_id: self.group_id,
            master_device_id: self.master_device_id,
            members: self.roster(),
        }
    }
}

impl Default for GroupInfo {
    fn default() -> Self {
        Self::solo()
    }
}
