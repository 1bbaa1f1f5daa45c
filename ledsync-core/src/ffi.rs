//! C ABI for linking ledsync-core as a static library from C/C++ firmware hosts.
//! The host owns the radio and the clock: it feeds received packets and `now_ms`, and receives
//! outbound packets and events through the callbacks in `LedsyncCallbacks`.

use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int};
use std::slice;

use crate::config::SyncConfig;
use crate::core::{OutboundAction, SyncManager};
use crate::effect::{EffectSyncState, EFFECT_STATE_LEN};
use crate::event::SyncEvent;
use crate::identity::{DeviceId, PeerAddress};
use crate::mode::{MemoryModeStore, SyncMode};

/// Send a packet. `dest_6` is the peer address, or ff:ff:ff:ff:ff:ff for broadcast.
pub type SendCallback = extern "C" fn(ctx: *mut c_void, dest_6: *const u8, data: *const u8, len: usize);

/// Event notification. `kind` is one of the `LEDSYNC_EVENT_*` codes; `id` carries the device or
/// group ID, `value` the time offset for TIME_SYNCED.
pub type EventCallback = extern "C" fn(ctx: *mut c_void, kind: u8, id: u32, value: i64);

pub const LEDSYNC_EVENT_DEVICE_DISCOVERED: u8 = 1;
pub const LEDSYNC_EVENT_GROUP_FOUND: u8 = 2;
pub const LEDSYNC_EVENT_GROUP_CREATED: u8 = 3;
pub const LEDSYNC_EVENT_GROUP_JOINED: u8 = 4;
pub const LEDSYNC_EVENT_GROUP_LEFT: u8 = 5;
pub const LEDSYNC_EVENT_TIME_SYNCED: u8 = 6;
/// Fetch the snapshot with `ledsync_core_effect_state`.
pub const LEDSYNC_EVENT_EFFECT_STATE: u8 = 7;

#[repr(C)]
pub struct LedsyncCallbacks {
    pub ctx: *mut c_void,
    pub send: Option<SendCallback>,
    pub event: Option<EventCallback>,
}

fn deliver(actions: Vec<OutboundAction>, cbs: *const LedsyncCallbacks) {
    if cbs.is_null() {
        return;
    }
    let cbs = unsafe { &*cbs };
    for action in actions {
        match action {
            OutboundAction::SendTo(to, frame) => {
                if let Some(send) = cbs.send {
                    send(cbs.ctx, to.as_bytes().as_ptr(), frame.as_ptr(), frame.len());
                }
            }
            OutboundAction::Broadcast(frame) => {
                if let Some(send) = cbs.send {
                    send(
                        cbs.ctx,
                        PeerAddress::BROADCAST.as_bytes().as_ptr(),
                        frame.as_ptr(),
                        frame.len(),
                    );
                }
            }
            OutboundAction::Notify(event) => {
                if let Some(notify) = cbs.event {
                    let (kind, id, value) = event_code(&event);
                    notify(cbs.ctx, kind, id, value);
                }
            }
        }
    }
}

fn event_code(event: &SyncEvent) -> (u8, u32, i64) {
    match event {
        SyncEvent::DeviceDiscovered { device_id, .. } => {
            (LEDSYNC_EVENT_DEVICE_DISCOVERED, device_id.as_u32(), 0)
        }
        SyncEvent::GroupFound { group_id, .. } => (LEDSYNC_EVENT_GROUP_FOUND, *group_id, 0),
        SyncEvent::GroupCreated { group_id } => (LEDSYNC_EVENT_GROUP_CREATED, *group_id, 0),
        SyncEvent::GroupJoined { group_id } => (LEDSYNC_EVENT_GROUP_JOINED, *group_id, 0),
        SyncEvent::GroupLeft { group_id } => (LEDSYNC_EVENT_GROUP_LEFT, *group_id, 0),
        SyncEvent::TimeSynced { offset_ms } => (LEDSYNC_EVENT_TIME_SYNCED, 0, *offset_ms),
        SyncEvent::EffectStateReceived(_) => (LEDSYNC_EVENT_EFFECT_STATE, 0, 0),
    }
}

fn read_address(addr_6: *const u8) -> PeerAddress {
    let mut bytes = [0u8; 6];
    unsafe {
        bytes.copy_from_slice(slice::from_raw_parts(addr_6, 6));
    }
    PeerAddress::from_bytes(bytes)
}

/// Derive a device ID from a NUL-terminated serial. Null or empty serial uses the random fallback.
#[no_mangle]
pub extern "C" fn ledsync_core_device_id_from_serial(serial: *const c_char) -> u32 {
    let serial = if serial.is_null() {
        None
    } else {
        unsafe { CStr::from_ptr(serial) }.to_str().ok()
    };
    DeviceId::derive(serial).as_u32()
}

/// Create a manager with default timing. `initial_mode` is the persisted mode byte (0 solo,
/// 1 join, 2 host); the host persists changes itself via `ledsync_core_sync_mode`.
/// Returns opaque handle or null on failure.
#[no_mangle]
pub extern "C" fn ledsync_core_create(
    device_id: u32,
    own_addr_6: *const u8,
    initial_mode: u8,
) -> *mut c_void {
    if own_addr_6.is_null() {
        return std::ptr::null_mut();
    }
    let Some(mode) = SyncMode::from_u8(initial_mode) else {
        return std::ptr::null_mut();
    };
    let store = Box::new(MemoryModeStore::with_mode(mode));
    match SyncManager::new(
        DeviceId(device_id),
        read_address(own_addr_6),
        SyncConfig::default(),
        store,
    ) {
        Ok(manager) => Box::into_raw(Box::new(manager)) as *mut c_void,
        Err(_) => std::ptr::null_mut(),
    }
}

/// Destroy manager. No-op if h is null.
#[no_mangle]
pub extern "C" fn ledsync_core_destroy(h: *mut c_void) {
    if h.is_null() {
        return;
    }
    let _ = unsafe { Box::from_raw(h as *mut SyncManager) };
}

/// Apply the initial mode (Host creates a group). Returns 0, or -1 if h is null.
#[no_mangle]
pub extern "C" fn ledsync_core_start(
    h: *mut c_void,
    now_ms: u64,
    cbs: *const LedsyncCallbacks,
) -> c_int {
    if h.is_null() {
        return -1;
    }
    let manager = unsafe { &mut *(h as *mut SyncManager) };
    deliver(manager.start(now_ms), cbs);
    0
}

/// Queue a received packet for the next tick. Returns 0, or -1 on null arguments.
#[no_mangle]
pub extern "C" fn ledsync_core_enqueue_packet(
    h: *mut c_void,
    from_6: *const u8,
    bytes: *const u8,
    len: usize,
) -> c_int {
    if h.is_null() || from_6.is_null() || bytes.is_null() {
        return -1;
    }
    let manager = unsafe { &mut *(h as *mut SyncManager) };
    let data = unsafe { slice::from_raw_parts(bytes, len) }.to_vec();
    manager.enqueue_packet(read_address(from_6), data);
    0
}

/// One host-loop pass. Returns 0, or -1 if h is null.
#[no_mangle]
pub extern "C" fn ledsync_core_tick(
    h: *mut c_void,
    now_ms: u64,
    cbs: *const LedsyncCallbacks,
) -> c_int {
    if h.is_null() {
        return -1;
    }
    let manager = unsafe { &mut *(h as *mut SyncManager) };
    deliver(manager.tick(now_ms), cbs);
    0
}

/// Create a group (0 = random ID). Returns 0, or -1 if h is null.
#[no_mangle]
pub extern "C" fn ledsync_core_create_group(
    h: *mut c_void,
    group_id: u32,
    now_ms: u64,
    cbs: *const LedsyncCallbacks,
) -> c_int {
    if h.is_null() {
        return -1;
    }
    let manager = unsafe { &mut *(h as *mut SyncManager) };
    deliver(manager.create_group(group_id, now_ms), cbs);
    0
}

/// Join a discovered group. Returns 0, or -1 if h is null.
#[no_mangle]
pub extern "C" fn ledsync_core_join_group(
    h: *mut c_void,
    group_id: u32,
    now_ms: u64,
    cbs: *const LedsyncCallbacks,
) -> c_int {
    if h.is_null() {
        return -1;
    }
    let manager = unsafe { &mut *(h as *mut SyncManager) };
    deliver(manager.join_group(group_id, now_ms), cbs);
    0
}

/// Leave the current group. Returns 0, or -1 if h is null.
#[no_mangle]
pub extern "C" fn ledsync_core_leave_group(
    h: *mut c_void,
    now_ms: u64,
    cbs: *const LedsyncCallbacks,
) -> c_int {
    if h.is_null() {
        return -1;
    }
    let manager = unsafe { &mut *(h as *mut SyncManager) };
    deliver(manager.leave_group(now_ms), cbs);
    0
}

/// Set sync mode (0 solo, 1 join, 2 host). Returns 0, or -1 on null handle or unknown mode.
#[no_mangle]
pub extern "C" fn ledsync_core_set_sync_mode(
    h: *mut c_void,
    mode: u8,
    now_ms: u64,
    cbs: *const LedsyncCallbacks,
) -> c_int {
    if h.is_null() {
        return -1;
    }
    let Some(mode) = SyncMode::from_u8(mode) else {
        return -1;
    };
    let manager = unsafe { &mut *(h as *mut SyncManager) };
    deliver(manager.set_sync_mode(mode, now_ms), cbs);
    0
}

/// Current sync mode byte, or -1 if h is null.
#[no_mangle]
pub extern "C" fn ledsync_core_sync_mode(h: *mut c_void) -> c_int {
    if h.is_null() {
        return -1;
    }
    let manager = unsafe { &*(h as *const SyncManager) };
    manager.sync_mode().as_u8() as c_int
}

/// Current group ID (0 when solo, or when h is null).
#[no_mangle]
pub extern "C" fn ledsync_core_group_id(h: *mut c_void) -> u32 {
    if h.is_null() {
        return 0;
    }
    let manager = unsafe { &*(h as *const SyncManager) };
    manager.group_info().group_id
}

/// 1 if this device is group master, 0 if not, -1 if h is null.
#[no_mangle]
pub extern "C" fn ledsync_core_is_master(h: *mut c_void) -> c_int {
    if h.is_null() {
        return -1;
    }
    let manager = unsafe { &*(h as *const SyncManager) };
    manager.is_group_master() as c_int
}

/// Roster size (including self), or -1 if h is null.
#[no_mangle]
pub extern "C" fn ledsync_core_member_count(h: *mut c_void) -> c_int {
    if h.is_null() {
        return -1;
    }
    let manager = unsafe { &*(h as *const SyncManager) };
    manager.group_info().members.len() as c_int
}

/// 1 if synced to the master's clock, 0 if not, -1 if h is null.
#[no_mangle]
pub extern "C" fn ledsync_core_is_time_synced(h: *mut c_void) -> c_int {
    if h.is_null() {
        return -1;
    }
    let manager = unsafe { &*(h as *const SyncManager) };
    manager.is_time_synced() as c_int
}

/// Group-synchronized time. Falls back to `now_ms` when unsynced or h is null.
#[no_mangle]
pub extern "C" fn ledsync_core_synced_time(h: *mut c_void, now_ms: u64) -> u64 {
    if h.is_null() {
        return now_ms;
    }
    let manager = unsafe { &*(h as *const SyncManager) };
    manager.synced_time(now_ms)
}

/// Estimated offset to the master's clock in ms (0 for a master or null handle).
#[no_mangle]
pub extern "C" fn ledsync_core_time_offset(h: *mut c_void) -> i64 {
    if h.is_null() {
        return 0;
    }
    let manager = unsafe { &*(h as *const SyncManager) };
    manager.time_offset()
}

/// Buffer a snapshot for replication (master only). `len` must equal the snapshot size.
/// Returns 0, or -1 on null arguments or wrong length.
#[no_mangle]
pub extern "C" fn ledsync_core_set_effect_state(
    h: *mut c_void,
    bytes: *const u8,
    len: usize,
) -> c_int {
    if h.is_null() || bytes.is_null() || len != EFFECT_STATE_LEN {
        return -1;
    }
    let manager = unsafe { &mut *(h as *mut SyncManager) };
    let mut raw = [0u8; EFFECT_STATE_LEN];
    unsafe {
        raw.copy_from_slice(slice::from_raw_parts(bytes, EFFECT_STATE_LEN));
    }
    manager.set_effect_sync_state(EffectSyncState::from_bytes(raw));
    0
}

/// Copy the cached snapshot into out_buf. Returns bytes written, or -1 if out_buf is too small.
#[no_mangle]
pub extern "C" fn ledsync_core_effect_state(
    h: *mut c_void,
    out_buf: *mut u8,
    out_buf_len: usize,
) -> c_int {
    if h.is_null() || out_buf.is_null() || out_buf_len < EFFECT_STATE_LEN {
        return -1;
    }
    let manager = unsafe { &*(h as *const SyncManager) };
    let state = manager.effect_sync_state();
    unsafe {
        out_buf.copy_from_nonoverlapping(state.as_bytes().as_ptr(), EFFECT_STATE_LEN);
    }
    EFFECT_STATE_LEN as c_int
}

/// Enable (non-zero) or disable (0) effect replication. Returns 0, or -1 if h is null.
#[no_mangle]
pub extern "C" fn ledsync_core_enable_effect_sync(h: *mut c_void, enabled: c_int) -> c_int {
    if h.is_null() {
        return -1;
    }
    let manager = unsafe { &mut *(h as *mut SyncManager) };
    manager.enable_effect_sync(enabled != 0);
    0
}

/// 1 if effect replication is enabled, 0 if not, -1 if h is null.
#[no_mangle]
pub extern "C" fn ledsync_core_is_effect_sync_enabled(h: *mut c_void) -> c_int {
    if h.is_null() {
        return -1;
    }
    let manager = unsafe { &*(h as *const SyncManager) };
    manager.is_effect_sync_enabled() as c_int
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Captured {
        frames: Vec<([u8; 6], Vec<u8>)>,
        events: Vec<(u8, u32, i64)>,
    }

    extern "C" fn on_send(ctx: *mut c_void, dest_6: *const u8, data: *const u8, len: usize) {
        let cap = unsafe { &mut *(ctx as *mut Captured) };
        let mut dest = [0u8; 6];
        dest.copy_from_slice(unsafe { slice::from_raw_parts(dest_6, 6) });
        let bytes = unsafe { slice::from_raw_parts(data, len) }.to_vec();
        cap.frames.push((dest, bytes));
    }

    extern "C" fn on_event(ctx: *mut c_void, kind: u8, id: u32, value: i64) {
        let cap = unsafe { &mut *(ctx as *mut Captured) };
        cap.events.push((kind, id, value));
    }

    #[test]
    fn host_mode_through_c_abi() {
        let addr = [0x24, 0, 0, 0, 0, 1];
        let h = ledsync_core_create(42, addr.as_ptr(), SyncMode::Host.as_u8());
        assert!(!h.is_null());
        let mut cap = Captured {
            frames: Vec::new(),
            events: Vec::new(),
        };
        let cbs = LedsyncCallbacks {
            ctx: &mut cap as *mut Captured as *mut c_void,
            send: Some(on_send),
            event: Some(on_event),
        };
        assert_eq!(ledsync_core_start(h, 0, &cbs), 0);
        assert_eq!(ledsync_core_is_master(h), 1);
        assert_ne!(ledsync_core_group_id(h), 0);
        assert_eq!(ledsync_core_sync_mode(h), 2);
        assert!(cap
            .events
            .iter()
            .any(|(kind, _, _)| *kind == LEDSYNC_EVENT_GROUP_CREATED));
        assert!(cap.frames.iter().all(|(dest, _)| *dest == [0xff; 6]));

        assert_eq!(ledsync_core_set_sync_mode(h, 9, 10, &cbs), -1);
        assert_eq!(ledsync_core_set_sync_mode(h, 0, 10, &cbs), 0);
        assert_eq!(ledsync_core_group_id(h), 0);
        ledsync_core_destroy(h);
    }

    #[test]
    fn effect_state_length_checked() {
        let addr = [0x24, 0, 0, 0, 0, 2];
        let h = ledsync_core_create(7, addr.as_ptr(), 0);
        let short = [1u8; EFFECT_STATE_LEN - 1];
        assert_eq!(ledsync_core_set_effect_state(h, short.as_ptr(), short.len()), -1);
        let mut out = [0u8; EFFECT_STATE_LEN];
        assert_eq!(
            ledsync_core_effect_state(h, out.as_mut_ptr(), out.len()),
            EFFECT_STATE_LEN as c_int
        );
        assert_eq!(ledsync_core_enable_effect_sync(h, 0), 0);
        assert_eq!(ledsync_core_is_effect_sync_enabled(h), 0);
        ledsync_core_destroy(h);
    }

    #[test]
    fn null_handles_rejected() {
        let null = std::ptr::null_mut();
        assert_eq!(ledsync_core_tick(null, 0, std::ptr::null()), -1);
        assert_eq!(ledsync_core_group_id(null), 0);
        assert_eq!(ledsync_core_synced_time(null, 123), 123);
        assert!(ledsync_core_create(1, std::ptr::null(), 0).is_null());
        assert!(ledsync_core_create(1, [0u8; 6].as_ptr(), 7).is_null());
        assert_ne!(ledsync_core_device_id_from_serial(std::ptr::null()), 0);
    }
}
