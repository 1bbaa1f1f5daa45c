//! Several devices wired through an in-memory broadcast medium.

use std::collections::VecDeque;

use ledsync_core::{
    DeviceId, EffectSyncState, MemoryModeStore, OutboundAction, PeerAddress, Role, SyncConfig,
    SyncEvent, SyncListener, SyncManager, SyncMode, EFFECT_STATE_LEN,
};

struct Node {
    manager: SyncManager,
    events: Vec<SyncEvent>,
}

/// Delivers every frame on the next `step`. `deliver` can be turned off to simulate loss.
struct Bus {
    nodes: Vec<Node>,
    in_flight: VecDeque<(PeerAddress, Option<PeerAddress>, Vec<u8>)>,
    deliver: bool,
}

fn addr(n: u8) -> PeerAddress {
    PeerAddress([0x24, 0x0a, 0xc4, 0, 0, n])
}

impl Bus {
    fn new(count: u8) -> Self {
        let nodes = (1..=count)
            .map(|n| Node {
                manager: SyncManager::new(
                    DeviceId(n as u32 * 100),
                    addr(n),
                    SyncConfig::default(),
                    Box::new(MemoryModeStore::new()),
                )
                .unwrap(),
                events: Vec::new(),
            })
            .collect();
        Self {
            nodes,
            in_flight: VecDeque::new(),
            deliver: true,
        }
    }

    fn node(&mut self, n: u8) -> &mut SyncManager {
        &mut self.nodes[n as usize - 1].manager
    }

    fn collect(&mut self, from: u8, actions: Vec<OutboundAction>) {
        for action in actions {
            match action {
                OutboundAction::SendTo(to, frame) => {
                    self.in_flight.push_back((addr(from), Some(to), frame))
                }
                OutboundAction::Broadcast(frame) => {
                    self.in_flight.push_back((addr(from), None, frame))
                }
                OutboundAction::Notify(e) => self.nodes[from as usize - 1].events.push(e),
            }
        }
    }

    /// Call an API on node `n` and capture its outbound actions.
    fn with(&mut self, n: u8, f: impl FnOnce(&mut SyncManager) -> Vec<OutboundAction>) {
        let actions = f(self.node(n));
        self.collect(n, actions);
    }

    /// Hand queued frames to their receivers, then tick everyone once.
    fn step(&mut self, now_ms: u64) {
        while let Some((from, to, frame)) = self.in_flight.pop_front() {
            if !self.deliver {
                continue;
            }
            for node in &mut self.nodes {
                let me = node.manager.address();
                let addressed = match to {
                    Some(t) => t == me,
                    None => true,
                };
                if addressed {
                    node.manager.enqueue_packet(from, frame.clone());
                }
            }
        }
        for n in 1..=self.nodes.len() as u8 {
            let actions = self.node(n).tick(now_ms);
            self.collect(n, actions);
        }
    }

    fn run(&mut self, from_ms: u64, to_ms: u64, step_ms: u64) {
        let mut t = from_ms;
        while t <= to_ms {
            self.step(t);
            t += step_ms;
        }
    }
}

#[test]
fn join_propagates_roster_to_member() {
    let mut bus = Bus::new(2);
    bus.with(1, |a| a.create_group(0x1234, 0));
    bus.step(0); // B hears the announce
    assert!(bus
        .node(2)
        .discovered_groups()
        .iter()
        .any(|g| g.group_id == 0x1234));

    bus.with(2, |b| b.join_group(0x1234, 10));
    bus.step(10); // A processes the join and rebroadcasts GROUP_INFO
    bus.step(20); // B processes the roster
    assert_eq!(bus.node(1).group_info().members.len(), 2);
    assert_eq!(bus.node(2).group_info().members.len(), 2);
    assert_eq!(bus.node(2).group_info().master_device_id, DeviceId(100));
}

#[test]
fn member_syncs_clock_after_join() {
    let mut bus = Bus::new(2);
    bus.with(1, |a| a.create_group(0x1234, 0));
    bus.step(0);
    bus.with(2, |b| b.join_group(0x1234, 10));
    bus.step(10);
    bus.step(20);
    // Shared clock on the bus: zero RTT-corrected offset, rtt 10 -> 10 + 5 - 20 = -5
    assert!(bus.node(2).is_time_synced());
    assert_eq!(bus.node(2).time_offset(), -5);
    assert!(bus.nodes[1]
        .events
        .iter()
        .any(|e| matches!(e, SyncEvent::TimeSynced { offset_ms: -5 })));
}

#[test]
fn master_disband_reaches_all_members() {
    let mut bus = Bus::new(3);
    bus.with(1, |a| a.create_group(0x1234, 0));
    bus.step(0);
    bus.with(2, |b| b.join_group(0x1234, 10));
    bus.with(3, |c| c.join_group(0x1234, 10));
    bus.run(10, 100, 10);
    assert_eq!(bus.node(1).group_info().members.len(), 3);

    bus.with(1, |a| a.leave_group(110));
    bus.step(110);
    assert!(!bus.node(2).is_grouped());
    assert!(!bus.node(3).is_grouped());
    for n in [1, 2, 3] {
        assert!(bus.nodes[n - 1]
            .events
            .iter()
            .any(|e| matches!(e, SyncEvent::GroupLeft { group_id: 0x1234 })));
    }
}

#[test]
fn members_stay_grouped_under_steady_heartbeats() {
    let mut bus = Bus::new(2);
    bus.with(1, |a| a.set_sync_mode(SyncMode::Host, 0));
    bus.with(2, |b| b.set_sync_mode(SyncMode::Join, 0));
    bus.run(0, 30_000, 100);
    assert_eq!(bus.node(1).group_info().role(), Role::Master);
    assert_eq!(bus.node(2).group_info().role(), Role::Member);
    let member_gid = bus.node(2).group_info().group_id;
    let master_gid = bus.node(1).group_info().group_id;
    assert_eq!(member_gid, master_gid);
    assert_eq!(bus.node(1).group_info().members.len(), 2);
    assert!(bus.node(2).is_time_synced());
}

#[test]
fn silence_dissolves_the_group() {
    let mut bus = Bus::new(2);
    bus.with(1, |a| a.set_sync_mode(SyncMode::Host, 0));
    bus.with(2, |b| b.set_sync_mode(SyncMode::Join, 0));
    bus.run(0, 5_000, 100);
    assert!(bus.node(2).is_grouped());

    bus.deliver = false;
    bus.run(5_100, 15_000, 100);
    assert!(!bus.node(2).is_grouped(), "member leaves once the advert expires");
    assert_eq!(
        bus.node(1).group_info().members.len(),
        1,
        "master drops the silent member"
    );
    assert!(bus.node(1).is_group_master());
}

#[test]
fn effect_state_replicates_to_members() {
    #[derive(Default)]
    struct Renderer {
        applied: Vec<EffectSyncState>,
    }
    impl SyncListener for Renderer {
        fn on_effect_state_received(&mut self, state: &EffectSyncState) {
            self.applied.push(*state);
        }
    }

    let mut bus = Bus::new(2);
    bus.with(1, |a| a.set_sync_mode(SyncMode::Host, 0));
    bus.with(2, |b| b.set_sync_mode(SyncMode::Join, 0));
    bus.run(0, 1_000, 100);

    let mut raw = [0u8; EFFECT_STATE_LEN];
    raw[0] = 4; // effect index
    raw[1] = 200; // brightness
    let state = EffectSyncState::from_bytes(raw);
    bus.node(1).set_effect_sync_state(state);
    bus.run(1_100, 1_500, 100);

    assert_eq!(bus.node(2).effect_sync_state(), state);
    let mut renderer = Renderer::default();
    for e in &bus.nodes[1].events {
        e.dispatch(&mut renderer);
    }
    assert!(!renderer.applied.is_empty());
    assert!(renderer.applied.iter().all(|s| *s == state));
}

#[test]
fn host_switch_moves_member_into_its_own_group() {
    let mut bus = Bus::new(2);
    bus.with(1, |a| a.set_sync_mode(SyncMode::Host, 0));
    bus.with(2, |b| b.set_sync_mode(SyncMode::Join, 0));
    bus.run(0, 1_000, 100);
    let original = bus.node(1).group_info().group_id;

    bus.with(2, |b| b.set_sync_mode(SyncMode::Host, 1_050));
    bus.run(1_100, 2_000, 100);
    assert!(bus.node(2).is_group_master());
    assert_ne!(bus.node(2).group_info().group_id, original);
    assert_eq!(bus.node(1).group_info().members.len(), 1);
}
