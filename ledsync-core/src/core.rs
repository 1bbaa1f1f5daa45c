//! Host-driven API: SyncManager receives packets, time and commands from the host, returns actions.
//!
//! One `tick` = drain queued packets, run due periodic senders, run the timeout sweeps, then let
//! the sync mode drive automatic joins. Nothing here blocks or performs I/O.

use std::collections::VecDeque;

use tracing::{debug, info, trace, warn};

use crate::config::{ConfigError, SyncConfig};
use crate::directory::{DiscoveredDevice, GroupAdvert, GroupDirectory, PeerDirectory, Upsert};
use crate::effect::{EffectReplicator, EffectSyncState};
use crate::event::SyncEvent;
use crate::identity::{random_group_id, DeviceId, GroupId, PeerAddress};
use crate::membership::{GroupInfo, GroupMember, Role};
use crate::mode::{ModeStore, SyncMode};
use crate::protocol::{Message, MAX_GROUP_MEMBERS};
use crate::timer::Interval;
use crate::timesync::{self, SampleOutcome, TimeSyncEstimator};
use crate::wire;

/// Action for host to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    /// Unicast an encoded sync packet.
    SendTo(PeerAddress, Vec<u8>),
    /// Send an encoded sync packet to the broadcast address.
    Broadcast(Vec<u8>),
    /// Deliver a notification to the application.
    Notify(SyncEvent),
}

/// Main coordinator. One instance per device, owned by the host loop.
pub struct SyncManager {
    device_id: DeviceId,
    address: PeerAddress,
    config: SyncConfig,
    group: GroupInfo,
    peers: PeerDirectory,
    groups: GroupDirectory,
    time_sync: TimeSyncEstimator,
    effect: EffectReplicator,
    mode: SyncMode,
    store: Box<dyn ModeStore>,
    heartbeat_timer: Interval,
    announce_timer: Interval,
    info_timer: Interval,
    inbox: VecDeque<(PeerAddress, Vec<u8>)>,
    /// Group whose master disbanded it; skipped by auto-join until it is announced again.
    disbanded: Option<GroupId>,
}

impl SyncManager {
    /// Build the manager and load the persisted sync mode (Solo if absent or unreadable).
    /// Call `start` once afterwards to apply it.
    pub fn new(
        device_id: DeviceId,
        address: PeerAddress,
        config: SyncConfig,
        mut store: Box<dyn ModeStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mode = match store.load() {
            Ok(m) => m.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "failed to load sync mode, defaulting to solo");
                SyncMode::Solo
            }
        };
        Ok(Self {
            device_id,
            address,
            group: GroupInfo::solo(),
            peers: PeerDirectory::new(address, config.discovery_timeout_ms),
            groups: GroupDirectory::new(address, config.group_discovery_timeout_ms),
            time_sync: TimeSyncEstimator::new(config.time_sync_interval_ms),
            effect: EffectReplicator::new(config.effect_sync_interval_ms),
            mode,
            store,
            heartbeat_timer: Interval::new(config.heartbeat_interval_ms),
            announce_timer: Interval::new(config.group_announce_interval_ms),
            info_timer: Interval::new(config.group_info_interval_ms),
            inbox: VecDeque::new(),
            disbanded: None,
            config,
        })
    }

    /// Apply the loaded mode: Host creates a group right away; Join starts auto-joining on tick.
    pub fn start(&mut self, now_ms: u64) -> Vec<OutboundAction> {
        info!(device_id = %self.device_id, address = %self.address, mode = %self.mode, "sync starting");
        if self.mode == SyncMode::Host && !self.group.is_grouped() {
            return self.create_group(0, now_ms);
        }
        Vec::new()
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn address(&self) -> PeerAddress {
        self.address
    }

    fn own_member(&self) -> GroupMember {
        GroupMember {
            device_id: self.device_id,
            address: self.address,
        }
    }

    // ----- group membership -----

    /// Host a new group. `requested_id == 0` picks a random non-zero ID. No-op if already grouped.
    pub fn create_group(&mut self, requested_id: GroupId, now_ms: u64) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        if self.group.is_grouped() {
            debug!(group_id = self.group.group_id, "create_group ignored: already grouped");
            return actions;
        }
        let group_id = if requested_id != 0 {
            requested_id
        } else {
            random_group_id()
        };
        let own = self.own_member();
        self.group.become_master(group_id, own);
        debug!(group_id, "group created");

        self.broadcast(&mut actions, &self.group.announce_message());
        self.broadcast(&mut actions, &self.group.info_message());
        self.announce_timer.mark(now_ms);
        self.info_timer.mark(now_ms);
        actions.push(OutboundAction::Notify(SyncEvent::GroupCreated { group_id }));
        actions
    }

    /// Join an advertised group. No-op if the group has not been heard or is already joined.
    pub fn join_group(&mut self, group_id: GroupId, now_ms: u64) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        let Some(advert) = self.groups.get(group_id).copied() else {
            debug!(group_id, "join_group ignored: group not discovered");
            return actions;
        };
        if self.group.group_id == group_id {
            debug!(group_id, "join_group ignored: already in group");
            return actions;
        }
        if self.group.is_grouped() {
            actions.extend(self.leave_group(now_ms));
        }

        let own = self.own_member();
        self.group
            .become_member(group_id, advert.master_device_id, own);
        self.time_sync.reset();
        debug!(group_id, master = %advert.master_device_id, "joining group");

        self.send_to(
            &mut actions,
            advert.master_address,
            &Message::GroupJoin {
                group_id,
                device_id: self.device_id,
            },
        );
        let request = self.time_sync.request(now_ms);
        self.send_to(&mut actions, advert.master_address, &request);
        actions.push(OutboundAction::Notify(SyncEvent::GroupJoined { group_id }));
        actions
    }

    /// Leave the current group. A master disbands it for everyone; a member asks to be removed.
    /// Local state resets immediately; nothing is awaited.
    pub fn leave_group(&mut self, _now_ms: u64) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        let group_id = self.group.group_id;
        match self.group.role() {
            Role::Solo => return actions,
            Role::Master => {
                debug!(group_id, "disbanding group");
                self.broadcast(
                    &mut actions,
                    &Message::GroupLeave {
                        group_id,
                        device_id: self.device_id,
                    },
                );
            }
            Role::Member => {
                debug!(group_id, "leaving group");
                let leave = Message::GroupLeave {
                    group_id,
                    device_id: self.device_id,
                };
                match self.master_address() {
                    Some(master) => self.send_to(&mut actions, master, &leave),
                    None => trace!(group_id, "master address unknown, leave not sent"),
                }
            }
        }
        self.reset_to_solo();
        actions.push(OutboundAction::Notify(SyncEvent::GroupLeft { group_id }));
        actions
    }

    fn reset_to_solo(&mut self) {
        self.group.reset();
        self.time_sync.reset();
    }

    /// Master's address: from the roster if listed there, else from its group advert.
    fn master_address(&self) -> Option<PeerAddress> {
        let master_id = self.group.master_device_id;
        self.group
            .members
            .values()
            .find(|m| m.device_id == master_id)
            .map(|m| m.address)
            .or_else(|| {
                self.groups
                    .get(self.group.group_id)
                    .map(|g| g.master_address)
            })
    }

    pub fn group_info(&self) -> &GroupInfo {
        &self.group
    }

    pub fn is_grouped(&self) -> bool {
        self.group.is_grouped()
    }

    pub fn is_group_master(&self) -> bool {
        self.group.is_master
    }

    pub fn discovered_devices(&self) -> Vec<DiscoveredDevice> {
        let mut out: Vec<DiscoveredDevice> = self.peers.devices().copied().collect();
        out.sort_by_key(|d| d.address);
        out
    }

    pub fn discovered_groups(&self) -> Vec<GroupAdvert> {
        let mut out: Vec<GroupAdvert> = self.groups.groups().copied().collect();
        out.sort_by_key(|g| g.group_id);
        out
    }

    // ----- sync mode -----

    pub fn sync_mode(&self) -> SyncMode {
        self.mode
    }

    /// Switch policy, persist it, and sequence the leave/create needed to reach it.
    pub fn set_sync_mode(&mut self, mode: SyncMode, now_ms: u64) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        if mode == self.mode {
            return actions;
        }
        info!(from = %self.mode, to = %mode, "sync mode changed");
        self.mode = mode;
        if let Err(e) = self.store.save(mode) {
            warn!(error = %e, %mode, "failed to persist sync mode");
        }

        match (mode, self.group.role()) {
            (SyncMode::Solo, Role::Master | Role::Member) => {
                actions.extend(self.leave_group(now_ms));
            }
            (SyncMode::Join, Role::Master) => {
                actions.extend(self.leave_group(now_ms));
            }
            (SyncMode::Host, Role::Solo) => {
                actions.extend(self.create_group(0, now_ms));
            }
            (SyncMode::Host, Role::Member) => {
                actions.extend(self.leave_group(now_ms));
                actions.extend(self.create_group(0, now_ms));
            }
            _ => {}
        }
        actions
    }

    fn auto_join(&mut self, now_ms: u64) -> Vec<OutboundAction> {
        if self.mode != SyncMode::Join || self.group.is_grouped() {
            return Vec::new();
        }
        let disbanded = self.disbanded;
        let candidate = self
            .groups
            .groups()
            .map(|g| g.group_id)
            .find(|id| Some(*id) != disbanded);
        match candidate {
            Some(group_id) => {
                debug!(group_id, "auto-joining discovered group");
                self.join_group(group_id, now_ms)
            }
            None => Vec::new(),
        }
    }

    // ----- time sync -----

    pub fn is_time_synced(&self) -> bool {
        self.group.is_master || self.group.time_synced
    }

    /// Local clock shifted onto the master's timeline; plain local time until synced.
    pub fn synced_time(&self, now_ms: u64) -> u64 {
        timesync::synced_time(&self.group, now_ms)
    }

    pub fn time_offset(&self) -> i64 {
        if self.group.is_master {
            0
        } else {
            self.group.time_offset_ms
        }
    }

    // ----- effect replication -----

    /// Buffer the application's snapshot for the next broadcast. Ignored unless master.
    pub fn set_effect_sync_state(&mut self, state: EffectSyncState) {
        if !self.group.is_master {
            trace!("effect state ignored: not group master");
            return;
        }
        self.effect.set_local(state);
    }

    pub fn effect_sync_state(&self) -> EffectSyncState {
        self.effect.state()
    }

    pub fn is_effect_sync_enabled(&self) -> bool {
        self.effect.is_enabled()
    }

    pub fn enable_effect_sync(&mut self, enabled: bool) {
        self.effect.set_enabled(enabled);
    }

    // ----- inbound -----

    /// Transport dispatch callback: queue a packet for the next tick.
    pub fn enqueue_packet(&mut self, from: PeerAddress, bytes: Vec<u8>) {
        self.inbox.push_back((from, bytes));
    }

    /// Process one received packet immediately. Malformed packets are dropped untouched.
    pub fn on_packet_received(
        &mut self,
        from: PeerAddress,
        bytes: &[u8],
        now_ms: u64,
    ) -> Vec<OutboundAction> {
        let msg = match wire::decode_frame(bytes) {
            Ok(m) => m,
            Err(e) => {
                trace!(%from, error = %e, "dropping packet");
                return Vec::new();
            }
        };
        self.on_message(from, msg, now_ms)
    }

    fn on_message(&mut self, from: PeerAddress, msg: Message, now_ms: u64) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        match msg {
            Message::Heartbeat { device_id } => {
                match self.peers.on_heartbeat(from, device_id, now_ms) {
                    Upsert::New => {
                        debug!(%device_id, %from, "device discovered");
                        actions.push(OutboundAction::Notify(SyncEvent::DeviceDiscovered {
                            device_id,
                            address: from,
                        }));
                    }
                    Upsert::SelfFiltered => trace!("own heartbeat ignored"),
                    Upsert::Refreshed => {}
                }
            }
            Message::GroupAnnounce {
                group_id,
                master_device_id,
            } => {
                let upsert = self
                    .groups
                    .on_announce(from, group_id, master_device_id, now_ms);
                if !matches!(upsert, Upsert::SelfFiltered) && self.disbanded == Some(group_id) {
                    trace!(group_id, "disbanded group announced again");
                    self.disbanded = None;
                }
                match upsert {
                    Upsert::New => {
                        debug!(group_id, master = %master_device_id, "group found");
                        actions.push(OutboundAction::Notify(SyncEvent::GroupFound {
                            group_id,
                            master_device_id,
                        }));
                    }
                    Upsert::SelfFiltered => trace!("own announcement ignored"),
                    Upsert::Refreshed => {}
                }
            }
            Message::GroupJoin {
                group_id,
                device_id,
            } => {
                if !self.group.is_master || group_id != self.group.group_id || from == self.address
                {
                    return actions;
                }
                if !self.group.members.contains_key(&from)
                    && self.group.members.len() >= MAX_GROUP_MEMBERS
                {
                    warn!(group_id, %device_id, "group full, join ignored");
                    return actions;
                }
                if self.group.add_member(GroupMember {
                    device_id,
                    address: from,
                }) {
                    debug!(group_id, %device_id, %from, "member joined");
                }
                self.broadcast(&mut actions, &self.group.info_message());
                self.info_timer.mark(now_ms);
            }
            Message::GroupInfo {
                group_id,
                master_device_id,
                members,
            } => {
                if self.group.role() != Role::Member || group_id != self.group.group_id {
                    return actions;
                }
                self.group.replace_roster(master_device_id, &members);
                trace!(group_id, members = members.len(), "roster replaced");
            }
            Message::GroupLeave {
                group_id,
                device_id,
            } => {
                if group_id != self.group.group_id {
                    return actions;
                }
                match self.group.role() {
                    Role::Master => {
                        if from != self.address && self.group.remove_member(&from).is_some() {
                            debug!(group_id, %device_id, "member left");
                            self.broadcast(&mut actions, &self.group.info_message());
                            self.info_timer.mark(now_ms);
                        }
                    }
                    Role::Member => {
                        if device_id == self.group.master_device_id {
                            debug!(group_id, "group disbanded by master");
                            self.reset_to_solo();
                            self.disbanded = Some(group_id);
                            actions.push(OutboundAction::Notify(SyncEvent::GroupLeft {
                                group_id,
                            }));
                        }
                    }
                    Role::Solo => {}
                }
            }
            Message::TimeRequest { request_timestamp } => {
                if self.group.is_master {
                    self.send_to(
                        &mut actions,
                        from,
                        &Message::TimeResponse {
                            request_timestamp,
                            master_timestamp: now_ms,
                        },
                    );
                }
            }
            Message::TimeResponse {
                request_timestamp,
                master_timestamp,
            } => {
                if self.group.role() != Role::Member {
                    return actions;
                }
                match self.time_sync.on_response(
                    &mut self.group,
                    request_timestamp,
                    master_timestamp,
                    now_ms,
                ) {
                    SampleOutcome::FirstSync(offset_ms) => {
                        debug!(offset_ms, "time synced");
                        actions.push(OutboundAction::Notify(SyncEvent::TimeSynced { offset_ms }));
                    }
                    SampleOutcome::Updated(offset_ms) => trace!(offset_ms, "time offset updated"),
                }
            }
            Message::EffectState(state) => {
                if self.group.role() != Role::Member {
                    return actions;
                }
                self.effect.on_received(state);
                actions.push(OutboundAction::Notify(SyncEvent::EffectStateReceived(state)));
            }
        }
        actions
    }

    // ----- periodic work -----

    /// One pass of the host loop: inbound dispatch, periodic senders, sweeps, auto-join.
    pub fn tick(&mut self, now_ms: u64) -> Vec<OutboundAction> {
        let mut actions = Vec::new();

        while let Some((from, bytes)) = self.inbox.pop_front() {
            actions.extend(self.on_packet_received(from, &bytes, now_ms));
        }

        self.run_periodic(&mut actions, now_ms);

        self.peers.sweep(now_ms);
        for advert in self.groups.sweep(now_ms) {
            debug!(group_id = advert.group_id, "group advert expired");
            if advert.group_id == self.group.group_id && self.group.role() == Role::Member {
                debug!(group_id = advert.group_id, "master lost, leaving group");
                actions.extend(self.leave_group(now_ms));
            }
        }
        self.member_timeout_sweep(&mut actions, now_ms);

        actions.extend(self.auto_join(now_ms));
        actions
    }

    fn run_periodic(&mut self, actions: &mut Vec<OutboundAction>, now_ms: u64) {
        if self.heartbeat_timer.poll(now_ms) {
            self.broadcast(
                actions,
                &Message::Heartbeat {
                    device_id: self.device_id,
                },
            );
        }
        match self.group.role() {
            Role::Master => {
                if self.announce_timer.poll(now_ms) {
                    self.broadcast(actions, &self.group.announce_message());
                }
                if self.info_timer.poll(now_ms) {
                    self.broadcast(actions, &self.group.info_message());
                }
                if let Some(state) = self.effect.due(now_ms) {
                    self.broadcast(actions, &Message::EffectState(state));
                }
            }
            Role::Member => {
                if let Some(request) = self.time_sync.poll_request(now_ms) {
                    if let Some(master) = self.master_address() {
                        self.send_to(actions, master, &request);
                    }
                }
            }
            Role::Solo => {}
        }
    }

    /// Drop roster entries (other than self) without a recent heartbeat. The master republishes
    /// the roster if anything was dropped.
    fn member_timeout_sweep(&mut self, actions: &mut Vec<OutboundAction>, now_ms: u64) {
        if !self.group.is_grouped() {
            return;
        }
        let timeout = self.config.member_timeout_ms;
        let stale: Vec<PeerAddress> = self
            .group
            .members
            .keys()
            .filter(|addr| **addr != self.address)
            .filter(|addr| !self.peers.is_fresh(addr, now_ms, timeout))
            .copied()
            .collect();
        if stale.is_empty() {
            return;
        }
        for addr in &stale {
            if let Some(m) = self.group.remove_member(addr) {
                debug!(group_id = self.group.group_id, device_id = %m.device_id, "member timed out");
            }
        }
        if self.group.is_master {
            self.broadcast(actions, &self.group.info_message());
            self.info_timer.mark(now_ms);
        }
    }

    // ----- outbound helpers -----

    fn broadcast(&self, actions: &mut Vec<OutboundAction>, msg: &Message) {
        match wire::encode_frame(msg) {
            Ok(frame) => actions.push(OutboundAction::Broadcast(frame)),
            Err(e) => warn!(error = %e, "failed to encode {:?}", msg.sub_type()),
        }
    }

    fn send_to(&self, actions: &mut Vec<OutboundAction>, to: PeerAddress, msg: &Message) {
        match wire::encode_frame(msg) {
            Ok(frame) => actions.push(OutboundAction::SendTo(to, frame)),
            Err(e) => warn!(error = %e, "failed to encode {:?}", msg.sub_type()),
        }
    }
}
