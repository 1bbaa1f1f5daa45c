//! Group synchronization for networked LED lighting controllers.
//! Host-driven: no I/O; host passes packets and time, and receives actions.

pub mod config;
pub mod directory;
pub mod effect;
pub mod event;
pub mod identity;
pub mod membership;
pub mod mode;
pub mod protocol;
pub mod timer;
pub mod timesync;
pub mod wire;

pub mod core;
pub mod ffi;

pub use config::{ConfigError, SyncConfig};
pub use crate::core::{OutboundAction, SyncManager};
pub use directory::{DiscoveredDevice, GroupAdvert};
pub use effect::{EffectSyncState, EFFECT_STATE_LEN};
pub use event::{SyncEvent, SyncListener};
pub use identity::{DeviceId, GroupId, PeerAddress};
pub use membership::{GroupInfo, GroupMember, Role};
pub use mode::{MemoryModeStore, ModeStore, StoreError, SyncMode};
pub use protocol::{Message, SYNC_PACKET_TAG};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
