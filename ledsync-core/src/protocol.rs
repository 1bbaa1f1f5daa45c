//! Sync wire protocol: packet tags and message types.

use crate::effect::EffectSyncState;
use crate::identity::{DeviceId, GroupId};
use crate::membership::GroupMember;

/// Outer message-type tag shared by every sync packet.
pub const SYNC_PACKET_TAG: u8 = 0xA5;

/// Upper bound on roster size carried in one GROUP_INFO.
pub const MAX_GROUP_MEMBERS: usize = 16;

/// Second byte of every sync packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubType {
    Heartbeat = 1,
    GroupAnnounce = 2,
    GroupJoin = 3,
    GroupInfo = 4,
    GroupLeave = 5,
    TimeRequest = 6,
    TimeResponse = 7,
    EffectState = 8,
}

impl SubType {
    pub fn from_u8(b: u8) -> Option<Self> {
        Some(match b {
            1 => SubType::Heartbeat,
            2 => SubType::GroupAnnounce,
            3 => SubType::GroupJoin,
            4 => SubType::GroupInfo,
            5 => SubType::GroupLeave,
            6 => SubType::TimeRequest,
            7 => SubType::TimeResponse,
            8 => SubType::EffectState,
            _ => return None,
        })
    }
}

/// All sync messages. Encoding is per-variant fixed layout (see wire module).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Liveness and discovery; broadcast periodically by every device.
    Heartbeat { device_id: DeviceId },
    /// Master advertises its group.
    GroupAnnounce {
        group_id: GroupId,
        master_device_id: DeviceId,
    },
    /// Member asks the master to be added.
    GroupJoin {
        group_id: GroupId,
        device_id: DeviceId,
    },
    /// Full roster snapshot from the master. Receivers overwrite, never merge.
    GroupInfo {
        group_id: GroupId,
        master_device_id: DeviceId,
        members: Vec<GroupMember>,
    },
    /// From a member: "remove me". From the master: the group is disbanded.
    GroupLeave {
        group_id: GroupId,
        device_id: DeviceId,
    },
    TimeRequest { request_timestamp: u64 },
    TimeResponse {
        request_timestamp: u64,
        master_timestamp: u64,
    },
    EffectState(EffectSyncState),
}

impl Message {
    pub fn sub_type(&self) -> SubType {
        match self {
            Message::Heartbeat { .. } => SubType::Heartbeat,
            Message::GroupAnnounce { .. } => SubType::GroupAnnounce,
            Message::GroupJoin { .. } => SubType::GroupJoin,
            Message::GroupInfo { .. } => SubType::GroupInfo,
            Message::GroupLeave { .. } => SubType::GroupLeave,
            Message::TimeRequest { .. } => SubType::TimeRequest,
            Message::TimeResponse { .. } => SubType::TimeResponse,
            Message::EffectState(_) => SubType::EffectState,
        }
    }
}
