//! Framing: sync tag byte + sub-type byte + fixed-layout bincode payload.
//!
//! Every payload is length-checked against its sub-type's fixed size before any field is decoded.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::effect::{EffectSyncState, EFFECT_STATE_LEN};
use crate::identity::{DeviceId, PeerAddress};
use crate::membership::GroupMember;
use crate::protocol::{Message, SubType, MAX_GROUP_MEMBERS, SYNC_PACKET_TAG};

const HEADER_LEN: usize = 2;

const HEARTBEAT_LEN: usize = 4;
const GROUP_ANNOUNCE_LEN: usize = 8;
const GROUP_JOIN_LEN: usize = 8;
const GROUP_INFO_HEADER_LEN: usize = 9;
const MEMBER_ENTRY_LEN: usize = 10;
const GROUP_LEAVE_LEN: usize = 8;
const TIME_REQUEST_LEN: usize = 8;
const TIME_RESPONSE_LEN: usize = 16;

#[derive(Serialize, Deserialize)]
struct HeartbeatPayload {
    device_id: u32,
}

#[derive(Serialize, Deserialize)]
struct GroupAnnouncePayload {
    group_id: u32,
    master_device_id: u32,
}

/// Shared by GROUP_JOIN and GROUP_LEAVE.
#[derive(Serialize, Deserialize)]
struct GroupDevicePayload {
    group_id: u32,
    device_id: u32,
}

#[derive(Serialize, Deserialize)]
struct GroupInfoHeader {
    group_id: u32,
    master_device_id: u32,
    member_count: u8,
}

#[derive(Serialize, Deserialize)]
struct MemberEntry {
    device_id: u32,
    address: [u8; 6],
}

#[derive(Serialize, Deserialize)]
struct TimeRequestPayload {
    request_timestamp: u64,
}

#[derive(Serialize, Deserialize)]
struct TimeResponsePayload {
    request_timestamp: u64,
    master_timestamp: u64,
}

/// Encode a message into a single sync packet.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, FrameEncodeError> {
    let mut out = Vec::with_capacity(HEADER_LEN + 16);
    out.push(SYNC_PACKET_TAG);
    out.push(msg.sub_type() as u8);
    match msg {
        Message::Heartbeat { device_id } => bincode::serialize_into(
            &mut out,
            &HeartbeatPayload {
                device_id: device_id.0,
            },
        )?,
        Message::GroupAnnounce {
            group_id,
            master_device_id,
        } => bincode::serialize_into(
            &mut out,
            &GroupAnnouncePayload {
                group_id: *group_id,
                master_device_id: master_device_id.0,
            },
        )?,
        Message::GroupJoin {
            group_id,
            device_id,
        }
        | Message::GroupLeave {
            group_id,
            device_id,
        } => bincode::serialize_into(
            &mut out,
            &GroupDevicePayload {
                group_id: *group_id,
                device_id: device_id.0,
            },
        )?,
        Message::GroupInfo {
            group_id,
            master_device_id,
            members,
        } => {
            if members.len() > MAX_GROUP_MEMBERS {
                return Err(FrameEncodeError::TooManyMembers(members.len()));
            }
            bincode::serialize_into(
                &mut out,
                &GroupInfoHeader {
                    group_id: *group_id,
                    master_device_id: master_device_id.0,
                    member_count: members.len() as u8,
                },
            )?;
            for m in members {
                bincode::serialize_into(
                    &mut out,
                    &MemberEntry {
                        device_id: m.device_id.0,
                        address: m.address.0,
                    },
                )?;
            }
        }
        Message::TimeRequest { request_timestamp } => bincode::serialize_into(
            &mut out,
            &TimeRequestPayload {
                request_timestamp: *request_timestamp,
            },
        )?,
        Message::TimeResponse {
            request_timestamp,
            master_timestamp,
        } => bincode::serialize_into(
            &mut out,
            &TimeResponsePayload {
                request_timestamp: *request_timestamp,
                master_timestamp: *master_timestamp,
            },
        )?,
        Message::EffectState(state) => out.extend_from_slice(state.as_bytes()),
    }
    Ok(out)
}

/// Error encoding a message (bincode or roster size limit).
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("group roster too large: {0} members")]
    TooManyMembers(usize),
}

/// Decode one sync packet. Trailing bytes past the fixed layout are ignored.
pub fn decode_frame(bytes: &[u8]) -> Result<Message, FrameDecodeError> {
    let (&tag, rest) = bytes.split_first().ok_or(FrameDecodeError::Empty)?;
    if tag != SYNC_PACKET_TAG {
        return Err(FrameDecodeError::NotSyncPacket(tag));
    }
    let (&sub, payload) = rest.split_first().ok_or(FrameDecodeError::MissingSubType)?;
    let sub_type = SubType::from_u8(sub).ok_or(FrameDecodeError::UnknownSubType(sub))?;

    let msg = match sub_type {
        SubType::Heartbeat => {
            let p: HeartbeatPayload = fixed(sub_type, payload, HEARTBEAT_LEN)?;
            Message::Heartbeat {
                device_id: DeviceId(p.device_id),
            }
        }
        SubType::GroupAnnounce => {
            let p: GroupAnnouncePayload = fixed(sub_type, payload, GROUP_ANNOUNCE_LEN)?;
            Message::GroupAnnounce {
                group_id: p.group_id,
                master_device_id: DeviceId(p.master_device_id),
            }
        }
        SubType::GroupJoin => {
            let p: GroupDevicePayload = fixed(sub_type, payload, GROUP_JOIN_LEN)?;
            Message::GroupJoin {
                group_id: p.group_id,
                device_id: DeviceId(p.device_id),
            }
        }
        SubType::GroupLeave => {
            let p: GroupDevicePayload = fixed(sub_type, payload, GROUP_LEAVE_LEN)?;
            Message::GroupLeave {
                group_id: p.group_id,
                device_id: DeviceId(p.device_id),
            }
        }
        SubType::GroupInfo => {
            let h: GroupInfoHeader = fixed(sub_type, payload, GROUP_INFO_HEADER_LEN)?;
            let count = h.member_count as usize;
            let expected = GROUP_INFO_HEADER_LEN + count * MEMBER_ENTRY_LEN;
            if payload.len() < expected {
                return Err(FrameDecodeError::Truncated {
                    sub_type,
                    expected,
                    actual: payload.len(),
                });
            }
            let members = payload[GROUP_INFO_HEADER_LEN..expected]
                .chunks_exact(MEMBER_ENTRY_LEN)
                .map(|entry| -> Result<GroupMember, FrameDecodeError> {
                    let e: MemberEntry = bincode::deserialize(entry)?;
                    Ok(GroupMember {
                        device_id: DeviceId(e.device_id),
                        address: PeerAddress(e.address),
                    })
                })
                .collect::<Result<Vec<_>, FrameDecodeError>>()?;
            Message::GroupInfo {
                group_id: h.group_id,
                master_device_id: DeviceId(h.master_device_id),
                members,
            }
        }
        SubType::TimeRequest => {
            let p: TimeRequestPayload = fixed(sub_type, payload, TIME_REQUEST_LEN)?;
            Message::TimeRequest {
                request_timestamp: p.request_timestamp,
            }
        }
        SubType::TimeResponse => {
            let p: TimeResponsePayload = fixed(sub_type, payload, TIME_RESPONSE_LEN)?;
            Message::TimeResponse {
                request_timestamp: p.request_timestamp,
                master_timestamp: p.master_timestamp,
            }
        }
        SubType::EffectState => {
            if payload.len() < EFFECT_STATE_LEN {
                return Err(FrameDecodeError::Truncated {
                    sub_type,
                    expected: EFFECT_STATE_LEN,
                    actual: payload.len(),
                });
            }
            let mut raw = [0u8; EFFECT_STATE_LEN];
            raw.copy_from_slice(&payload[..EFFECT_STATE_LEN]);
            Message::EffectState(EffectSyncState::from_bytes(raw))
        }
    };
    Ok(msg)
}

fn fixed<T: DeserializeOwned>(
    sub_type: SubType,
    payload: &[u8],
    len: usize,
) -> Result<T, FrameDecodeError> {
    if payload.len() < len {
        return Err(FrameDecodeError::Truncated {
            sub_type,
            expected: len,
            actual: payload.len(),
        });
    }
    Ok(bincode::deserialize(&payload[..len])?)
}

/// Error decoding a sync packet. Callers drop the packet without touching state.
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("empty packet")]
    Empty,
    #[error("not a sync packet (tag {0:#04x})")]
    NotSyncPacket(u8),
    #[error("missing sub-type byte")]
    MissingSubType,
    #[error("unknown sub-type {0}")]
    UnknownSubType(u8),
    #[error("{sub_type:?} payload truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        sub_type: SubType,
        expected: usize,
        actual: usize,
    },
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}
